//! Mandelbrot CLI - headless front end for the interop pipeline.

use std::env;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::{debug, info};

use mandel_interop::prelude::*;
use mandel_interop::util::logging::{build_stamp, init_logging, init_tracing, install_panic_hook, Verbosity};

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut verbosity = Verbosity::Info;
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match Verbosity::from_flag(arg) {
            Some(v) => verbosity = v,
            None => filtered_args.push(arg),
        }
    }
    init_logging(verbosity);
    let _trace_guard = init_tracing();
    install_panic_hook();

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let command = filtered_args[0];
    let rest = &filtered_args[1..];
    let result = match command {
        "adapters" | "a" => cmd_adapters(),
        "render" | "r" => cmd_render(rest),
        "bench" | "b" => cmd_bench(rest),
        "view" | "v" => cmd_view(rest),
        "version" | "-V" | "--version" => {
            println!("{}", build_stamp());
            Ok(())
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!();
            print_help();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_help() {
    println!("mandel-cli - headless Mandelbrot compute pipeline");
    println!();
    println!("USAGE:");
    println!("    mandel-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    a, adapters                    List visible adapters and their class");
    println!("    r, render [gpu|cpu] --out F    Render one frame to an image file");
    println!("    b, bench  [gpu|cpu] --frames N Run N frames and print stats reports");
    println!("    v, view   [gpu|cpu]            Open the interactive viewer");
    println!("    h, help                        Show this help");
    println!();
    println!("PIPELINE OPTIONS:");
    println!("    --shared | --staged   Transfer path (default: shared)");
    println!("    --width N --height N  Canvas size");
    println!("    --iterations N        Iteration bound");
    println!("    --items N             Target work-items per group divisor");
    println!("    --kernel PATH         Kernel source file");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output");
    println!("    -q, --quiet      Errors only");
}

fn cmd_adapters() -> Result<()> {
    let adapters = list_adapters();
    if adapters.is_empty() {
        println!("No adapters found");
        return Ok(());
    }
    println!("Adapters ({}):", adapters.len());
    for (i, info) in adapters.iter().enumerate() {
        let class = DeviceClass::of(info.device_type)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{}] {:<3} {} ({:?}, {:?}) {}",
            i, class, info.name, info.backend, info.device_type, info.driver
        );
    }
    Ok(())
}

/// Build a pipeline from settings plus command arguments; returns leftover arguments.
fn open_pipeline(
    args: &[&str],
    presenter: &mut OffscreenPresenter,
) -> Result<(InteropPipeline, Settings, Vec<String>)> {
    let mut settings = Settings::load();
    let rest = settings.apply_args(args).map_err(anyhow::Error::msg)?;
    let mode = settings.transfer.forced().unwrap_or(StorageMode::Shared);

    let session = DeviceSession::open(settings.device)?;
    let source = KernelSource::resolve(settings.kernel_path.as_ref())?;
    let pipeline = InteropPipeline::setup(
        session,
        strategy_for(mode),
        &source,
        settings.target_items_per_group,
        presenter,
        settings.width,
        settings.height,
    )?;
    Ok((pipeline, settings, rest))
}

fn cmd_render(args: &[&str]) -> Result<()> {
    let mut presenter = OffscreenPresenter::new();
    let (mut pipeline, settings, rest) = open_pipeline(args, &mut presenter)?;

    let mut out = PathBuf::from("mandelbrot.png");
    let mut it = rest.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--out" | "-o" => out = PathBuf::from(it.next().context("--out expects a path")?),
            other => bail!("unknown render argument '{}'", other),
        }
    }

    let mut params = settings.params();
    let start = Instant::now();
    pipeline.run_frame(&mut params, &mut presenter)?;
    debug!("Frame took {:.2} ms", start.elapsed().as_secs_f64() * 1000.0);
    pipeline.close();

    presenter.save(&out)?;
    println!("{}", out.display());
    Ok(())
}

fn cmd_bench(args: &[&str]) -> Result<()> {
    let mut presenter = OffscreenPresenter::new();
    let (mut pipeline, settings, rest) = open_pipeline(args, &mut presenter)?;

    let mut frames: u32 = 300;
    let mut it = rest.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--frames" | "-f" => {
                frames = it
                    .next()
                    .context("--frames expects a count")?
                    .parse()
                    .context("--frames expects a count")?
            }
            other => bail!("unknown bench argument '{}'", other),
        }
    }

    let mut params = settings.params();
    let mut stats = StatsAccumulator::new(settings.report_interval);
    for _ in 0..frames {
        if let Some(report) = pipeline.run_timed_frame(&mut params, &mut presenter, &mut stats)? {
            println!("{}", report);
        }
    }
    info!("Ran {} frames with {} argument binds", pipeline.frame_count(), pipeline.rebind_count());
    pipeline.close();
    Ok(())
}

fn cmd_view(args: &[&str]) -> Result<()> {
    #[cfg(feature = "viewer")]
    {
        let mut settings = Settings::load();
        let rest = settings.apply_args(args).map_err(anyhow::Error::msg)?;
        if let Some(arg) = rest.first() {
            bail!("unknown view argument '{}'", arg);
        }
        mandel_interop::viewer::run(settings)
    }
    #[cfg(not(feature = "viewer"))]
    {
        let _ = args;
        bail!("Viewer not available. Rebuild with: cargo build --features viewer")
    }
}
