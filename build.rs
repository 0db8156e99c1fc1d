use std::process::Command;

fn main() {
    let cargo_version = env!("CARGO_PKG_VERSION");

    // Get git commit hash
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok();

    let git_hash = output
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // v0.1.0 (abc1234)
    let version = format!("v{} ({})", cargo_version, git_hash);

    println!("cargo:rustc-env=JCODE_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=JCODE_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
}
