use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=FARMHAND_GIT_REVISION");

    let build_date = command_stdout("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]);
    let git_revision = env::var("FARMHAND_GIT_REVISION")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| command_stdout("git", &["rev-parse", "--short=10", "HEAD"]));
    let target = env::var("TARGET").ok();

    emit("FARMHAND_BUILD_DATE_UTC", build_date);
    emit("FARMHAND_GIT_REVISION", git_revision);
    emit("FARMHAND_BUILD_TARGET", target);
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn emit(key: &str, value: Option<String>) {
    let value = value.unwrap_or_else(|| "unknown".to_owned());
    println!("cargo:rustc-env={key}={value}");
}
