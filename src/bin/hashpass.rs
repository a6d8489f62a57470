// Helper for seeding: prints the argon2 hash for a password so an initial
// admin row can be inserted by hand.
//
//   cargo run --bin hashpass -- <password>

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHasher};

fn main() {
    let password = match std::env::args().nth(1) {
        Some(p) => p,
        None => {
            eprintln!("usage: hashpass <password>");
            std::process::exit(1);
        }
    };

    let salt = SaltString::generate(&mut OsRng);
    match Argon2::default().hash_password(password.as_bytes(), &salt) {
        Ok(phc) => println!("{phc}"),
        Err(e) => {
            eprintln!("argon2 hash error: {e}");
            std::process::exit(1);
        }
    }
}
