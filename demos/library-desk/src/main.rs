//! Library front desk: walks through a typical auth session and prints
//! what the UI would be told to do.
//!
//! With `LIBRIS_BACKEND_URL` and `LIBRIS_ANON_KEY` set, runs against the
//! hosted backend and signs in with `LIBRIS_DEMO_EMAIL` /
//! `LIBRIS_DEMO_PASSWORD`. Otherwise uses a seeded in-memory backend.
//!
//! ```text
//! RUST_LOG=libris_session=debug cargo run -p library-desk
//! ```

use std::sync::Arc;

use libris::prelude::*;
use libris::protocol::{ProfileRecord, UserMetadata};

const DEMO_EMAIL_ENV: &str = "LIBRIS_DEMO_EMAIL";
const DEMO_PASSWORD_ENV: &str = "LIBRIS_DEMO_PASSWORD";

const ADMIN_EMAIL: &str = "ada@library.test";
const STUDENT_EMAIL: &str = "sam@library.test";
const DEMO_PASSWORD: &str = "correct horse battery staple";

/// A memory backend with one admin and one student, and the student's
/// session left over from a previous visit.
fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());

    let ada = backend.add_account(ADMIN_EMAIL, DEMO_PASSWORD, UserMetadata::default());
    backend.put_profile(ProfileRecord {
        id: ada,
        email: Some(ADMIN_EMAIL.into()),
        role: Some(Role::Admin.as_str().into()),
        name: Some("Ada".into()),
        student_id: None,
    });

    let sam = backend.add_account(STUDENT_EMAIL, DEMO_PASSWORD, UserMetadata::default());
    backend.put_profile(ProfileRecord {
        id: sam,
        email: Some(STUDENT_EMAIL.into()),
        role: Some(Role::Student.as_str().into()),
        name: Some("Sam".into()),
        student_id: Some("S-42".into()),
    });

    backend.restore_session(STUDENT_EMAIL);
    backend
}

fn describe(user: Option<&CurrentUser>) -> String {
    match user {
        Some(u) => format!(
            "{} <{}> as {}",
            u.name.as_deref().unwrap_or("(no name)"),
            u.email,
            u.role
        ),
        None => "nobody".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    libris::init_tracing();

    let (mut provider, email, password) = match BackendConfig::from_env() {
        Some(config) => {
            let email = std::env::var(DEMO_EMAIL_ENV)
                .map_err(|_| format!("{DEMO_EMAIL_ENV} is required with a hosted backend"))?;
            let password = std::env::var(DEMO_PASSWORD_ENV)
                .map_err(|_| format!("{DEMO_PASSWORD_ENV} is required with a hosted backend"))?;
            tracing::info!(url = %config.url, "using hosted backend");
            (AuthProvider::builder().mount_rest(config)?, email, password)
        }
        None => {
            tracing::info!("using in-memory backend");
            let provider = AuthProvider::builder().mount(seeded_backend());
            (provider, ADMIN_EMAIL.to_string(), DEMO_PASSWORD.to_string())
        }
    };

    let auth = provider.context();
    let mut effects = provider.take_effects().ok_or("effect stream already taken")?;
    let printer = tokio::spawn(async move {
        while let Some(effect) = effects.recv().await {
            match effect {
                UiEffect::Navigate { path, .. } => println!("  -> navigate to {path}"),
                UiEffect::Notify(notice) => {
                    let tag = match notice.level {
                        NoticeLevel::Success => "ok",
                        NoticeLevel::Error => "error",
                    };
                    println!("  [{tag}] {}: {}", notice.title, notice.message);
                }
            }
        }
    });

    let restored = auth.wait_until_ready().await?;
    println!("restored session: {}", describe(restored.user.as_ref()));
    if restored.user.is_some() {
        println!("signing out the previous visitor");
        auth.sign_out().await?;
    }

    println!("signing in with a typo");
    if let Err(e) = auth.sign_in(&email, "not the password").await {
        println!("  rejected: {}", e.user_message());
    }

    println!("signing in as {email}");
    auth.sign_in(&email, &password).await?;
    let state = auth.wait_until_ready().await?;
    println!(
        "signed in: {} (admin: {})",
        describe(state.user.as_ref()),
        state.is_admin()
    );

    println!("signing out");
    auth.sign_out().await?;
    auth.wait_until_ready().await?;

    provider.unmount().await;
    printer.await?;
    Ok(())
}
