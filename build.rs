// Stamps the binary's --version output with when and from what it was built.

use std::process::Command;

fn git_commit() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=10", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string()).filter(|hash| !hash.is_empty())
}

fn main() {
    let built = chrono::Utc::now().format("%Y-%m-%d").to_string();
    println!("cargo:rustc-env=TUNNEL_DNS_BUILD_DATE={}", built);

    let commit = git_commit().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=TUNNEL_DNS_GIT_HASH={}", commit);

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
