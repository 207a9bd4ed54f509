//! Prints a bcrypt hash for `ADMIN_PASSWORD_HASHES`.
//!
//! Usage: `wsa-hash-password <password>` or pipe the password on stdin.

use std::io::{self, BufRead};

use anyhow::{Context, Result, bail};
use bcrypt::DEFAULT_COST;

fn main() -> Result<()> {
    let password = match std::env::args().nth(1) {
        Some(password) => password,
        None => {
            let mut line = String::new();
            io::stdin()
                .lock()
                .read_line(&mut line)
                .context("Failed to read password from stdin")?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.is_empty() {
        bail!("Password must not be empty");
    }
    if password.len() > 72 {
        bail!("bcrypt only uses the first 72 bytes; choose a shorter password");
    }

    let hash = bcrypt::hash(&password, DEFAULT_COST).context("Failed to hash password")?;
    println!("{hash}");
    Ok(())
}
