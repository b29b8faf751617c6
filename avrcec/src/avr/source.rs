//! Source tracking
//!
//! The receiver reports its selected input as `SI<name>` lines. The first
//! one seen on a connection answers our status query and only records the
//! source; every later one is a user action and asks for the display to be
//! turned on. `PWON` and `PWSTANDBY` report the receiver's own power changes.

use serde::Deserialize;
use std::collections::HashSet;

pub static POWER_ON_TOKEN: &str = "PWON";
pub static STANDBY_TOKEN: &str = "PWSTANDBY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Nothing reported yet on the current connection.
    Unknown,
    Tuner,
    Phono,
    TvAudio,
    Dvd,
    Game,
    Aux1,
    Aux2,
    SatCable,
    BluRay,
    Cd,
    MediaPlayer,
    Network,
    Bluetooth,
}

static SOURCE_TOKENS: &[(&str, Source)] = &[
    ("SITUNER", Source::Tuner),
    ("SIPHONO", Source::Phono),
    ("SITV", Source::TvAudio),
    ("SIDVD", Source::Dvd),
    ("SIGAME", Source::Game),
    ("SIAUX1", Source::Aux1),
    ("SIAUX2", Source::Aux2),
    ("SISAT/CBL", Source::SatCable),
    ("SIBD", Source::BluRay),
    ("SICD", Source::Cd),
    ("SIMPLAY", Source::MediaPlayer),
    ("SINET", Source::Network),
    ("SIBT", Source::Bluetooth),
];

impl Source {
    /// Exact, case sensitive match of a receiver status line.
    pub fn from_token(token: &str) -> Option<Source> {
        SOURCE_TOKENS
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, source)| *source)
    }

    pub fn token(self) -> Option<&'static str> {
        SOURCE_TOKENS
            .iter()
            .find(|(_, source)| *source == self)
            .map(|(t, _)| *t)
    }

    /// Sources with no picture to show.
    pub fn is_audio_only(self) -> bool {
        matches!(
            self,
            Source::Tuner
                | Source::Phono
                | Source::TvAudio
                | Source::Cd
                | Source::Network
                | Source::Bluetooth
        )
    }
}

/// Which sources must not turn the display on by themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePolicy {
    suppressed: HashSet<Source>,
}

impl SourcePolicy {
    pub fn new<I: IntoIterator<Item = Source>>(suppressed: I) -> SourcePolicy {
        SourcePolicy {
            suppressed: suppressed.into_iter().collect(),
        }
    }

    pub fn suppresses_auto_power_on(&self, source: Source) -> bool {
        self.suppressed.contains(&source)
    }
}

impl Default for SourcePolicy {
    fn default() -> SourcePolicy {
        SourcePolicy::new(
            SOURCE_TOKENS
                .iter()
                .map(|(_, source)| *source)
                .filter(|source| source.is_audio_only()),
        )
    }
}

/// Result of interpreting one receiver line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// First source report on this connection: recorded, nothing else.
    Initial(Source),
    /// Source selected by the user: recorded, and the display should go on.
    Changed(Source),
    /// The receiver was powered on.
    PowerOn,
    /// The receiver went to standby.
    Standby,
    /// Anything else the receiver says.
    NoOp,
}

#[derive(Debug)]
pub struct SourceTracker {
    current: Source,
}

impl SourceTracker {
    pub fn new() -> SourceTracker {
        SourceTracker {
            current: Source::Unknown,
        }
    }

    pub fn current(&self) -> Source {
        self.current
    }

    /// Forget the current source, e.g. because the link was re-established.
    pub fn reset(&mut self) {
        self.current = Source::Unknown;
    }

    pub fn interpret(&mut self, line: &str) -> SourceEvent {
        if line == POWER_ON_TOKEN {
            return SourceEvent::PowerOn;
        }
        if line == STANDBY_TOKEN {
            return SourceEvent::Standby;
        }
        match Source::from_token(line) {
            Some(source) => {
                let previous = std::mem::replace(&mut self.current, source);
                if previous == Source::Unknown {
                    SourceEvent::Initial(source)
                } else {
                    SourceEvent::Changed(source)
                }
            }
            None => SourceEvent::NoOp,
        }
    }
}

impl Default for SourceTracker {
    fn default() -> SourceTracker {
        SourceTracker::new()
    }
}
