pub fn print_startup_banner() {
    const RESET: &str = "\x1b[0m";
    const BANNER_COLOR: &str = "\x1b[38;5;64m";
    const DIM_GRAY: &str = "\x1b[2;90m";
    const BANNER: &str = r#"
  __                        _                     _
 / _| __ _ _ __ _ __ ___   | |__   __ _ _ __   __| |
| |_ / _` | '__| '_ ` _ \  | '_ \ / _` | '_ \ / _` |
|  _| (_| | |  | | | | | | | | | | (_| | | | | (_| |
|_|  \__,_|_|  |_| |_| |_| |_| |_|\__,_|_| |_|\__,_|
"#;
    const APP_DESCRIPTION: &str =
        "Unattended farm and friend-visit automation over the game gateway websocket.";
    const LIABILITY_NOTICE: &str =
        "Provided \"AS IS\", without warranty; account actions are your own responsibility.";

    println!("{BANNER_COLOR}{BANNER}{RESET}");
    println!(
        "{} v{} ({}) | build {} | {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("FARMHAND_GIT_REVISION"),
        env!("FARMHAND_BUILD_DATE_UTC"),
        env!("FARMHAND_BUILD_TARGET")
    );
    println!("{APP_DESCRIPTION}");
    println!("{DIM_GRAY}{LIABILITY_NOTICE}{RESET}");
    println!();
    println!("================================================================");
    println!();
}
