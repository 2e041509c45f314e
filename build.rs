//! Stamps the build date and time into `MANDEL_BUILD_DATE` / `MANDEL_BUILD_TIME`.
//! Either can be pinned from the environment for reproducible builds.

use time::format_description::{self, FormatItem};

fn stamp(var: &str, now: time::OffsetDateTime, format: &[FormatItem<'_>]) {
    println!("cargo:rerun-if-env-changed={}", var);
    let value = std::env::var(var)
        .unwrap_or_else(|_| now.format(format).unwrap_or_else(|_| "unknown".to_string()));
    println!("cargo:rustc-env={}={}", var, value);
}

fn main() {
    let now = time::OffsetDateTime::now_utc();
    let date_fmt = format_description::parse("[month repr:short] [day padding:space] [year]")
        .expect("valid date format");
    let time_fmt = format_description::parse("[hour]:[minute]:[second]")
        .expect("valid time format");

    stamp("MANDEL_BUILD_DATE", now, &date_fmt);
    stamp("MANDEL_BUILD_TIME", now, &time_fmt);
}
