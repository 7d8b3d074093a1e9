//! Settings file, command line, and the interactive booking prompt.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use tracing::info;

use crate::models::BookingRequest;
use crate::profile::SiteProfile;
use crate::request::{BookingRecord, PreferencesRecord};
use crate::retry::EngineSettings;

#[derive(Debug, Parser)]
#[command(
    name = "seat-finder",
    version,
    about = "Watch cinema booking pages and alert when the showing you want is bookable"
)]
pub struct Cli {
    /// Path to the JSON settings file
    #[arg(short, long, env = "SEAT_FINDER_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Enter one booking interactively instead of reading `bookings` from the file
    #[arg(long)]
    pub prompt: bool,

    /// Check once and exit without scheduling
    #[arg(long)]
    pub once: bool,

    /// Override the check interval from the settings file
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bookings: Vec<BookingRecord>,
    /// Seconds between two checks
    pub interval_secs: u64,
    pub headless: bool,
    pub engine: EngineSettings,
    /// Extra site profiles, matched before the built-in ones
    pub profiles: Vec<SiteProfile>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bookings: Vec::new(),
            interval_secs: 300,
            headless: true,
            engine: EngineSettings::default(),
            profiles: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_json(raw: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(raw).context("Failed to parse settings")?;
        if settings.interval_secs == 0 {
            bail!("interval_secs must be greater than zero");
        }
        Ok(settings)
    }

    /// Read the settings file. A missing file is only acceptable when the
    /// booking comes from the prompt.
    pub fn load(path: &Path, allow_missing: bool) -> Result<Self> {
        if allow_missing && !path.exists() {
            info!("{} not found, using default settings", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid settings in {}", path.display()))
    }

    /// Apply command-line overrides.
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(secs) = cli.interval_secs.filter(|s| *s > 0) {
            self.interval_secs = secs;
        }
        if cli.headed {
            self.headless = false;
        }
        self
    }

    /// Validate every configured booking. Any invalid entry aborts startup.
    pub fn requests(&self) -> Result<Vec<BookingRequest>> {
        if self.bookings.is_empty() {
            bail!("no bookings configured");
        }
        self.bookings
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record
                    .validate()
                    .with_context(|| format!("booking #{} ({})", index + 1, record.url))
            })
            .collect()
    }
}

fn ask(input: &mut impl BufRead, output: &mut impl Write, question: &str) -> Result<String> {
    write!(output, "{question}: ")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input closed while asking for {question}");
    }
    Ok(line.trim().to_string())
}

/// Collect a single booking from the terminal. Blank answers for the kind
/// and time mean "movie" and "any time".
pub fn prompt_booking(input: &mut impl BufRead, output: &mut impl Write) -> Result<BookingRecord> {
    let kind = ask(input, output, "Booking type [movie]")?;
    let url = ask(input, output, "Booking page URL")?;
    let title = ask(input, output, "Film title")?;
    let venue = ask(input, output, "Venue")?;
    let date = ask(input, output, "Date (YYYY-MM-DD)")?;
    let time = ask(input, output, "Time (HH:MM, blank for any)")?;

    let present = |value: String| (!value.is_empty()).then_some(value);
    Ok(BookingRecord {
        kind: if kind.is_empty() { "movie".to_string() } else { kind },
        url,
        preferences: PreferencesRecord {
            title: present(title),
            venue: present(venue),
            date: present(date),
            time: present(time),
        },
    })
}
