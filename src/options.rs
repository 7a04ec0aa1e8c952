// Copyright (c) The txtree developers.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::k_limits;

use clap::{App, AppSettings, Arg};
use itertools::Itertools;

/// Creates the clap::App metadata for argument parsing.
fn make_options_parser<'a>() -> App<'a, 'a> {
    // We could put this into lazy_static! with a Mutex around, but we really
    // do not expect to construct this more than once per regular program run.
    App::new("TXTREE")
        .setting(AppSettings::NoBinaryName)
        .version("v1.0.0")
        .arg(
            Arg::with_name("no_interpolation")
                .long("no_interpolation")
                .takes_value(false)
                .help("Disable the interpolation mechanism entirely.")
                .long_help(
                    "The tree is still maintained so the executor's bookkeeping keeps working, \
                     but no subsumption checks run and no table entries are created.",
                ),
        )
        .arg(
            Arg::with_name("output_tree")
                .long("output_tree")
                .takes_value(false)
                .help("Record the search tree for .dot file output.")
                .long_help(
                    "The tree is rendered in Graphviz dot format when save is called; recording \
                     is off by default because it retains every visited node.",
                ),
        )
        .arg(
            Arg::with_name("time_stat")
                .long("time_stat")
                .takes_value(false)
                .help("Display running time statistics of interpolation methods."),
        )
        .arg(
            Arg::with_name("no_existential")
                .long("no_existential")
                .takes_value(false)
                .help("Store summary values without shadow renaming.")
                .long_help(
                    "Without shadow renaming no existential quantification happens, so every \
                     subsumption query goes down the standard solver path.",
                ),
        )
        .arg(
            Arg::with_name("debug_subsumption")
                .long("debug_subsumption")
                .takes_value(true)
                .default_value("0")
                .help("Level of subsumption debug messages (0-3)."),
        )
        .arg(
            Arg::with_name("subsumption_timeout")
                .long("subsumption_timeout")
                .takes_value(true)
                .help("Seconds allowed per subsumption solver call.")
                .long_help("The default is 10 seconds. Zero removes the limit."),
        )
}

/// Options controlling the interpolation machinery, parsed once at start-up
/// and owned by the tree for the whole run.
#[derive(Clone, Debug)]
pub struct InterpolationOptions {
    pub interpolation: bool,
    pub output_tree: bool,
    pub time_stat: bool,
    pub no_existential: bool,
    pub debug_subsumption: u32,
    pub subsumption_timeout: f64,
}

impl Default for InterpolationOptions {
    fn default() -> InterpolationOptions {
        InterpolationOptions {
            interpolation: true,
            output_tree: false,
            time_stat: false,
            no_existential: false,
            debug_subsumption: 0,
            subsumption_timeout: k_limits::DEFAULT_SUBSUMPTION_TIMEOUT,
        }
    }
}

impl InterpolationOptions {
    /// Parses options from an argument string, split using unix shell
    /// escaping rules. Any content beyond the leftmost `--` token is returned
    /// (excluding this token) for the caller to interpret.
    pub fn parse_from_str(&mut self, s: &str) -> Vec<String> {
        let args = shellwords::split(s)
            .unwrap_or_else(|e| panic!("Cannot parse argument string: {:?}", e));
        self.parse(&args)
    }

    /// Parses options from a list of strings. Any content beyond the leftmost
    /// `--` token is returned (excluding this token).
    pub fn parse(&mut self, args: &[String]) -> Vec<String> {
        let mut own_args_end = args.len();
        let mut rest_start = args.len();
        if let Some((position, _)) = args.iter().find_position(|s| s.as_str() == "--") {
            own_args_end = position;
            rest_start = position + 1;
        }
        let matches = make_options_parser().get_matches_from(args[..own_args_end].iter());
        self.interpolation = !matches.is_present("no_interpolation");
        self.output_tree = matches.is_present("output_tree");
        self.time_stat = matches.is_present("time_stat");
        self.no_existential = matches.is_present("no_existential");
        if let Some(level) = matches.value_of("debug_subsumption") {
            self.debug_subsumption = level
                .parse()
                .unwrap_or_else(|_| panic!("--debug_subsumption expects an integer, got {}", level));
        }
        if let Some(seconds) = matches.value_of("subsumption_timeout") {
            self.subsumption_timeout = seconds.parse().unwrap_or_else(|_| {
                panic!("--subsumption_timeout expects a number, got {}", seconds)
            });
        }
        args[rest_start..].to_vec()
    }
}
