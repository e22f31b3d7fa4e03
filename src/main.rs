#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
#[macro_use]
extern crate nom;

pub mod assembler;
pub mod isa;

use std::process;

use clap::App;

use crate::assembler::assembler_errors::AsmError;
use crate::assembler::Assembler;

fn main() {
    env_logger::init();

    let yaml = load_yaml!("cli.yml");
    let matches = App::from_yaml(yaml).get_matches();

    // Missing paths are file errors with the file-error exit code, so they
    // are checked here instead of letting clap bail out.
    let input = matches.value_of("INPUT");
    let output = matches.value_of("output");
    let (input, output) = match (input, output) {
        (Some(input), Some(output)) => (input, output),
        (input, _) => {
            let err = if input.is_none() {
                AsmError::MissingInput
            } else {
                AsmError::MissingOutput
            };
            eprintln!("{}", err);
            process::exit(err.exit_code());
        }
    };

    let mut assembler = Assembler::new();
    if let Err(err) = assembler.run(input, output) {
        eprintln!("{}", err);
        process::exit(err.exit_code());
    }
}
