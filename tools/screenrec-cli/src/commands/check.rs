//! Check system capabilities.

use screenrec_platform_core::DisplayServer;
use screenrec_platform_linux::detect_display_server;
use screenrec_platform_linux::permissions::{
    check_capabilities, missing_required, print_capability_report,
};

pub fn run(json: bool) -> anyhow::Result<()> {
    let capabilities = check_capabilities();
    if json {
        println!("{}", serde_json::to_string_pretty(&capabilities)?);
        return Ok(());
    }

    println!("screenrec System Check");
    println!("{}", "=".repeat(50));
    match detect_display_server() {
        DisplayServer::Wayland => println!("[OK] Display server: Wayland"),
        DisplayServer::X11 => println!("[OK] Display server: X11"),
        _ => println!("[WARN] Display server: Unknown"),
    }
    println!();
    print_capability_report(&capabilities);

    println!();
    let missing = missing_required(&capabilities);
    if missing.is_empty() {
        println!("All required capabilities are available. screenrec is ready.");
    } else {
        println!("Missing required capabilities: {}. See above for fixes.", missing.join(", "));
        println!("`screenrec record --synthetic` works without them.");
    }
    Ok(())
}
