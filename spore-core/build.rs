//! Build script for Spore Core
//!
//! Emits `SPORE_BUILD_ID`, folded into the retained-memory header magic so
//! that flashing a new build invalidates state written by the old one.
//! Set `SPORE_BUILD_ID` in the environment for reproducible builds;
//! otherwise the build time is used.

use std::env;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-env-changed=SPORE_BUILD_ID");
    println!("cargo:rerun-if-changed=build.rs");

    let build_id = match env::var("SPORE_BUILD_ID") {
        Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            format!("t{}", secs)
        }
    };

    println!("cargo:rustc-env=SPORE_BUILD_ID={}", build_id);
}
