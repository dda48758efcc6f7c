use std::process::ExitCode;

use ec2_netconf::init;
use log::error;

fn main() -> ExitCode {
    match init::initialize() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if log::log_enabled!(log::Level::Error) {
                error!("Failed to configure network: {:#}", e);
                log::logger().flush();
            } else {
                // The logger may not have initialized.
                eprintln!("Failed to configure network: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
