// CLI entry point for the Driftmere world server.
//
// Starts a standalone server that game clients connect to over TCP (signaling
// and fallback) and UDP (data channel). See `server.rs` for the networking
// architecture and `session.rs` for session state.
//
// Usage:
//   driftmere-server [OPTIONS]
//     --port <PORT>        TCP listen port (default: 7878)
//     --udp-port <PORT>    UDP data port (default: OS-assigned)
//     --seed <N>           Terrain seed
//     --strategy <NAME>    Terrain strategy: hash_threshold | fractal_noise
//     --tick-hz <N>        Simulation rate (default: 20)
//     --config <PATH>      JSON config file; flags override its values

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use driftmere_server::server::{ServerConfig, start_server};
use driftmere_sim::SimConfig;

fn main() {
    env_logger::init();
    let config = parse_args();

    let (handle, tcp_addr, udp_addr) = match start_server(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start server: {e}");
            std::process::exit(1);
        }
    };

    println!("Listening on tcp {tcp_addr}, udp {udp_addr}");
    println!("Press Ctrl+C to stop.");

    // The event loop lives on background threads; park the main thread.
    // The process exits on SIGINT/SIGTERM, which tears everything down —
    // a signal-handler crate would only be needed for graceful shutdown.
    let running = Arc::new(AtomicBool::new(true));
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(250));
    }

    handle.stop();
}

/// Parse command-line arguments into a `ServerConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().skip(1).collect();
    parse_args_from(&args)
}

/// Two passes so a config file and flags compose the documented way: the
/// file supplies the base sim values, then flags override individual fields
/// no matter where `--config` appears on the command line.
fn parse_args_from(args: &[String]) -> ServerConfig {
    let mut config = ServerConfig::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                let path = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--config requires a path");
                    std::process::exit(1);
                });
                let json = std::fs::read_to_string(&path).unwrap_or_else(|e| {
                    eprintln!("cannot read {path}: {e}");
                    std::process::exit(1);
                });
                config.sim = SimConfig::from_json(&json).unwrap_or_else(|e| {
                    eprintln!("{e}");
                    std::process::exit(1);
                });
            }
            // Value-taking flags; handled in the second pass.
            "--port" | "--udp-port" | "--seed" | "--strategy" | "--tick-hz" => i += 1,
            _ => {}
        }
        i += 1;
    }

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--udp-port" => {
                i += 1;
                config.udp_port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--udp-port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--seed" => {
                i += 1;
                config.sim.terrain_seed =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--seed requires a valid number");
                        std::process::exit(1);
                    });
            }
            "--strategy" => {
                i += 1;
                let name = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--strategy requires a value");
                    std::process::exit(1);
                });
                config.sim.terrain_strategy =
                    match serde_json::from_value(serde_json::Value::String(name.clone())) {
                        Ok(s) => s,
                        Err(_) => {
                            eprintln!("unknown strategy: {name}");
                            std::process::exit(1);
                        }
                    };
            }
            "--tick-hz" => {
                i += 1;
                config.sim.tick_hz =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--tick-hz requires a valid number");
                        std::process::exit(1);
                    });
            }
            "--config" => {
                // Loaded in the first pass; skip the path here.
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

fn print_usage() {
    println!("Usage: driftmere-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>        TCP listen port (default: 7878)");
    println!("  --udp-port <PORT>    UDP data port (default: OS-assigned)");
    println!("  --seed <N>           Terrain seed");
    println!("  --strategy <NAME>    hash_threshold | fractal_noise");
    println!("  --tick-hz <N>        Simulation rate (default: 20)");
    println!("  --config <PATH>      JSON config file; flags override its values");
    println!("  --help, -h           Show this help");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn write_temp_config(name: &str, json: &str) -> String {
        let path = std::env::temp_dir().join(format!("driftmere-{}-{name}.json", std::process::id()));
        std::fs::write(&path, json).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn flags_override_config_regardless_of_order() {
        let path = write_temp_config(
            "order",
            r#"{"terrain_seed": 111, "tick_hz": 30}"#,
        );

        let before = parse_args_from(&args(&["--seed", "7", "--config", &path]));
        let after = parse_args_from(&args(&["--config", &path, "--seed", "7"]));
        for config in [&before, &after] {
            assert_eq!(config.sim.terrain_seed, 7, "flag should win over the file");
            assert_eq!(config.sim.tick_hz, 30, "unflagged values come from the file");
        }

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn ports_are_parsed_alongside_sim_flags() {
        let config = parse_args_from(&args(&["--port", "9000", "--udp-port", "9001", "--tick-hz", "10"]));
        assert_eq!(config.port, 9000);
        assert_eq!(config.udp_port, 9001);
        assert_eq!(config.sim.tick_hz, 10);
    }
}
