//! Mandelbrot viewer - real-time escape-time fractal on a compute device.

use std::env;

use mandel_interop::settings::Settings;
use mandel_interop::util::logging::{build_stamp, init_logging, init_tracing, Verbosity};

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut verbosity = Verbosity::Info;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage(&args[0]);
                return;
            }
            "-V" | "--version" => {
                println!("{}", build_stamp());
                return;
            }
            other => match Verbosity::from_flag(other) {
                Some(v) => verbosity = v,
                None => filtered_args.push(other),
            },
        }
    }
    init_logging(verbosity);
    let _trace_guard = init_tracing();

    let mut settings = Settings::load();
    match settings.apply_args(&filtered_args) {
        Ok(rest) if rest.is_empty() => {}
        Ok(rest) => {
            eprintln!("Unknown argument: {}", rest[0]);
            print_usage(&args[0]);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    #[cfg(feature = "viewer")]
    {
        if let Err(e) = mandel_interop::viewer::run(settings) {
            eprintln!("Viewer error: {:#}", e);
            std::process::exit(1);
        }
    }
    #[cfg(not(feature = "viewer"))]
    {
        let _ = settings;
        eprintln!("Viewer not available. Rebuild with: cargo build --features viewer");
        std::process::exit(1);
    }
}

fn print_usage(prog: &str) {
    println!("Mandelbrot viewer - compute/graphics interop demo");
    println!();
    println!("Usage: {} [gpu|cpu] [options]", prog);
    println!();
    println!("Options:");
    println!("  --shared           Share the renderer's device (zero-copy)");
    println!("  --staged           Read back through host memory");
    println!("  --width N          Initial canvas width");
    println!("  --height N         Initial canvas height");
    println!("  --iterations N     Iteration bound");
    println!("  --items N          Target work-items per group divisor");
    println!("  --kernel PATH      Load kernel source from PATH");
    println!("  -v, --verbose      Debug output");
    println!("  -vv, --trace       Trace output (very verbose)");
    println!("  -q, --quiet        Errors only");
    println!("  -V, --version      Show version");
    println!();
    println!("Keys:");
    println!("  a/d s/w  Pan      z/u  Zoom in/out   0-5  Presets");
    println!("  +/-      Iterations  f  Fullscreen   r    Reload kernel   Esc  Quit");
}
