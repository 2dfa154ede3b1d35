//! Version command implementation.

use console::style;

/// Execute the version command.
pub fn execute() {
    let version = env!("CARGO_PKG_VERSION");

    println!(
        "{} {} - trapped-ion control on a simulated rig",
        style("ionctl").cyan().bold(),
        style(format!("v{version}")).yellow()
    );
    println!();
    println!("Components:");
    println!("  ionctl-hal          Core, device and dataset interfaces");
    println!("  ionctl-devices      Switches, DDS, lasers and PMT array");
    println!("  ionctl-services     Classification, detection and ion loading");
    println!("  ionctl-adapter-sim  Simulated core, devices and ion trap");
    println!("  ionctl-cli          Command-line interface");
    println!();
    println!("License:    {}", style("Apache-2.0").dim());
}
