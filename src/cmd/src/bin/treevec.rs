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

use clap::Parser;
use thiserror_ext::AsReport;

fn main() {
    let cli = treevec_cmd::Cli::parse();
    treevec_rt::set_panic_abort();
    treevec_rt::init_treevec_logger(treevec_rt::LoggerSettings::new(cli.verbose));
    if let Err(error) = treevec_cmd::run(cli) {
        tracing::error!(error = %error.as_report(), "treevec failed");
        std::process::exit(1);
    }
}
