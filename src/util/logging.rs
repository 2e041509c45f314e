//! Process-wide logging, tracing and panic reporting.

use tracing_subscriber::prelude::*;

/// Verbosity selected on the command line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    /// Parse `-v`, `-vv` and `-q` style flags.
    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "-q" | "--quiet" => Some(Self::Quiet),
            "-v" | "--verbose" => Some(Self::Debug),
            "-vv" | "--trace" => Some(Self::Trace),
            _ => None,
        }
    }

    pub fn level(self) -> log::LevelFilter {
        match self {
            Self::Quiet => log::LevelFilter::Error,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Start env_logger. `RUST_LOG` still refines individual modules.
pub fn init_logging(verbosity: Verbosity) {
    let _ = env_logger::Builder::new()
        .filter_level(verbosity.level())
        // wgpu internals are noisy below warn
        .filter_module("wgpu_core", log::LevelFilter::Warn)
        .filter_module("wgpu_hal", log::LevelFilter::Warn)
        .filter_module("naga", log::LevelFilter::Warn)
        .parse_default_env()
        .try_init();
}

/// Chrome trace output to `trace.json` when `MANDEL_TRACE=1`.
pub fn init_tracing() -> Option<tracing_chrome::FlushGuard> {
    if std::env::var("MANDEL_TRACE").ok().as_deref() != Some("1") {
        return None;
    }

    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file("trace.json")
        .build();

    let subscriber = tracing_subscriber::registry().with(chrome_layer);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }

    Some(guard)
}

/// Friendly panic handler for GPU errors
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let msg = info.payload()
            .downcast_ref::<String>()
            .map(|s| s.as_str())
            .or_else(|| info.payload().downcast_ref::<&str>().copied())
            .unwrap_or("Unknown error");

        if msg.contains("wgpu") || msg.contains("Texture") || msg.contains("shader") {
            eprintln!("\n[GPU Error] {}", msg);
            eprintln!("\nThe device rejected a compute or copy command. Try --staged or another device class.");
        } else {
            eprintln!("\n[Error] {}", msg);
        }
        if let Some(loc) = info.location() {
            eprintln!("  at {}:{}:{}", loc.file(), loc.line(), loc.column());
        }
    }));
}

/// Build stamp written by build.rs.
pub fn build_stamp() -> String {
    let date = option_env!("MANDEL_BUILD_DATE").unwrap_or("unknown");
    let time = option_env!("MANDEL_BUILD_TIME").unwrap_or("unknown");
    format!("{} {} (built {} {})", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), date, time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Verbosity::from_flag("-v"), Some(Verbosity::Debug));
        assert_eq!(Verbosity::from_flag("-vv"), Some(Verbosity::Trace));
        assert_eq!(Verbosity::from_flag("-q"), Some(Verbosity::Quiet));
        assert_eq!(Verbosity::from_flag("gpu"), None);
        assert_eq!(Verbosity::default().level(), log::LevelFilter::Info);
    }

    #[test]
    fn test_build_stamp_names_package() {
        assert!(build_stamp().starts_with("mandel-interop "));
    }
}
