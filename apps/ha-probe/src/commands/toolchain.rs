use crate::cli::{FlashArgs, GlobalArgs, ToolchainArgs};
use crate::error::DiagError;
use crate::report;
use crate::toolchain::{RunOutcome, Toolchain};

pub async fn build(global: &GlobalArgs, args: &ToolchainArgs) -> Result<u8, DiagError> {
    let toolchain = Toolchain::new(args.idf_path.clone(), &global.project_dir)?;
    report::print_banner("ESP32-P4 Voice Assistant Build");
    println!("Working directory: {}", toolchain.project_dir().display());
    println!();
    println!("Starting build process...");
    println!("This may take a few minutes on first build...");
    println!();

    match toolchain.build().await? {
        RunOutcome::Interrupted => {
            println!();
            println!("Build interrupted by user");
            Ok(0)
        }
        RunOutcome::Exited(code) => {
            println!();
            println!("{}", report::heavy_rule());
            if code == 0 {
                println!("BUILD SUCCESS!");
                println!();
                println!("Next step: flash to board");
                println!("Run: ha-probe flash");
            } else {
                println!("BUILD FAILED!");
                println!("Exit code: {code}");
                println!();
                println!("Check errors above for details");
            }
            println!("{}", report::heavy_rule());
            Ok(code)
        }
    }
}

pub async fn flash(global: &GlobalArgs, args: &FlashArgs) -> Result<u8, DiagError> {
    let toolchain = Toolchain::new(args.toolchain.idf_path.clone(), &global.project_dir)?;
    report::print_banner("ESP32-P4 Voice Assistant Flash");
    println!("Port: {}", args.port);
    println!("Working directory: {}", toolchain.project_dir().display());
    println!();
    println!("Starting flash process...");
    println!("Make sure the board is connected!");
    println!("To exit monitor: Ctrl + ]");
    println!("{}", report::rule());

    match toolchain.flash(&args.port).await? {
        RunOutcome::Interrupted => {
            println!();
            println!("Flash interrupted by user");
            Ok(0)
        }
        RunOutcome::Exited(code) => Ok(code),
    }
}
