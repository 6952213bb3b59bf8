fn main() {
    // Load .env file for access point configuration
    load_env_config();

    linker_be_nice();
    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

/// Load access point configuration from .env file
/// Environment variables take priority over .env file values
fn load_env_config() {
    use std::env;
    use std::path::Path;

    const DEFAULT_AP_SSID: &str = "ESP32_LED_Control";
    const DEFAULT_AP_PASSWORD: &str = "12345678";

    // Tell cargo to rerun this build script if .env file changes
    println!("cargo:rerun-if-changed=.env");

    // Tell cargo to rerun if environment variables change
    println!("cargo:rerun-if-env-changed=AP_SSID");
    println!("cargo:rerun-if-env-changed=AP_PASSWORD");

    // Try to load .env file if it exists
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    // An unset SSID falls back to the default; an explicitly empty password
    // is kept and means an open network.
    let ap_ssid = env::var("AP_SSID")
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_AP_SSID.to_string());
    let ap_password = env::var("AP_PASSWORD")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| DEFAULT_AP_PASSWORD.to_string());

    if ap_ssid.len() > 32 {
        panic!("AP_SSID must be at most 32 bytes (got {})", ap_ssid.len());
    }
    if !ap_password.is_empty() && !(8..=63).contains(&ap_password.len()) {
        panic!(
            "AP_PASSWORD must be empty or 8-63 characters long (got {})",
            ap_password.len()
        );
    }

    // Set environment variables for the compilation
    println!("cargo:rustc-env=AP_SSID={}", ap_ssid);
    println!("cargo:rustc-env=AP_PASSWORD={}", ap_password);

    println!("cargo:warning=AP_SSID configured: {}", ap_ssid);
    if ap_password.is_empty() {
        println!("cargo:warning=AP_PASSWORD is empty - access point will be open");
    } else {
        println!("cargo:warning=AP_PASSWORD configured (length: {})", ap_password.len());
    }
}

fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                "_defmt_timestamp" => {
                    eprintln!();
                    eprintln!("💡 `defmt` not found - make sure `defmt.x` is added as a linker script and you have included `use defmt_rtt as _;`");
                    eprintln!();
                }
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                "esp_wifi_preempt_enable"
                | "esp_wifi_preempt_yield_task"
                | "esp_wifi_preempt_task_create" => {
                    eprintln!();
                    eprintln!("💡 `esp-wifi` has no scheduler enabled. Make sure you have the `builtin-scheduler` feature enabled, or that you provide an external scheduler.");
                    eprintln!();
                }
                "embedded_test_linker_file_not_added_to_rustflags" => {
                    eprintln!();
                    eprintln!("💡 `embedded-test` not found - make sure `embedded-test.x` is added as a linker script for tests");
                    eprintln!();
                }
                _ => (),
            },
            // we don't have anything helpful for "missing-lib" yet
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }

    println!(
        "cargo:rustc-link-arg=--error-handling-script={}",
        std::env::current_exe().unwrap().display()
    );
}
