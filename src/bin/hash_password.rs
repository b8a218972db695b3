//! Prints an Argon2id hash for seeding user rows by hand.
//!
//! Usage: `cargo run --bin hash_password -- <password>`

use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    let Some(password) = env::args().nth(1) else {
        eprintln!("Usage: hash_password <password>");
        return ExitCode::from(2);
    };
    match alumni_portal::auth::hash_password(&password) {
        Ok(hash) => {
            println!("{hash}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("hashing failed: {e}");
            ExitCode::FAILURE
        }
    }
}
