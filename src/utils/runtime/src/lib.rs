// Copyright 2025 TreeVec Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configures the TreeVec binaries: logging and panic handler.

use tracing::Level;
use tracing_subscriber::filter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;

pub struct LoggerSettings {
    /// Verbosity level from the command line: 0 = info, 1 = debug,
    /// 2+ = trace for the `treevec_*` crates.
    verbose: u8,
    /// Enable colorful output in console.
    colorful: bool,
}

impl LoggerSettings {
    pub fn new_default() -> Self {
        Self::new(0)
    }

    pub fn new(verbose: u8) -> Self {
        Self {
            verbose,
            colorful: console::colors_enabled_stderr(),
        }
    }
}

/// Configure log targets for all TreeVec crates.
fn configure_treevec_targets(targets: filter::Targets, level: Level) -> filter::Targets {
    targets
        .with_target("treevec_common", level)
        .with_target("treevec_ingest", level)
        .with_target("treevec_cmd", level)
}

/// Set panic hook to abort the process (without losing debug info and stack trace).
pub fn set_panic_abort() {
    use std::panic;

    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        default_hook(info);
        std::process::abort();
    }));
}

/// Init logger for TreeVec binaries.
pub fn init_treevec_logger(settings: LoggerSettings) {
    let level = match settings.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let fmt_layer = {
        // Configure log output to stderr
        let fmt_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_ansi(settings.colorful);

        let filter = filter::Targets::new()
            // Only enable WARN and ERROR for 3rd-party crates
            .with_target("reqwest", Level::WARN)
            .with_target("hyper", Level::WARN);

        let filter = configure_treevec_targets(filter, level);

        fmt_layer.with_filter(filter)
    };

    tracing_subscriber::registry().with(fmt_layer).init();
}
