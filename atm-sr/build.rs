//! Build script for atm-sr: stamps the startup log line with build info

include!("../build-support/build_info.rs");

fn main() {
    emit_build_info();
}
