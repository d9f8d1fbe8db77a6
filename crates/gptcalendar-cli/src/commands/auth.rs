//! Login, callback and logout commands.

use tracing::{info, warn};

use gptcalendar_auth::{Credential, Session};

use crate::callback::{self, CallbackListener};
use crate::commands::AuthContext;
use crate::config::PersistenceMode;
use crate::error::ClientResult;
use crate::session_file::SessionStore;

/// Starts a browser login.
///
/// The pending login is saved to the session file first, so the flow can
/// also be finished later with `gptcalendar callback`. When the redirect
/// URI is a loopback address the callback is captured directly.
pub async fn login(ctx: &AuthContext, no_browser: bool) -> ClientResult<()> {
    let redirect_uri = ctx.resolver.config().redirect_uri.clone();

    // Bind before the browser opens so the redirect can't race the listener.
    let listener = if callback::loopback_addr(&redirect_uri).is_some() {
        match CallbackListener::bind(&redirect_uri).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!("cannot capture the callback automatically: {}", e);
                None
            }
        }
    } else {
        None
    };

    let mut session = ctx.store.load()?;
    let authorization_url = ctx.resolver.begin_login_into(&mut session)?;
    ctx.store.save(&session)?;

    println!("Open this URL in your browser to authorize calendar access:");
    println!();
    println!("  {}", authorization_url);
    println!();

    if !no_browser {
        if let Err(e) = open::that(&authorization_url) {
            warn!("failed to open browser: {}", e);
        }
    }

    let Some(listener) = listener else {
        println!("After approving, copy the full URL the browser lands on and run:");
        println!();
        println!("  gptcalendar callback '<URL>'");
        return Ok(());
    };

    println!(
        "Waiting for the authorization callback (up to {} minutes)...",
        callback::CALLBACK_TIMEOUT.as_secs() / 60
    );
    let callback_url = listener.wait(callback::CALLBACK_TIMEOUT).await?;
    let credential = complete(ctx, &mut session, &callback_url).await?;
    print_login_success(ctx, &credential);
    Ok(())
}

/// Completes the pending login with a pasted callback URL.
pub async fn callback(ctx: &AuthContext, url: &str) -> ClientResult<()> {
    let mut session = ctx.store.load()?;
    let credential = complete(ctx, &mut session, url).await?;
    print_login_success(ctx, &credential);
    Ok(())
}

/// Runs the exchange and saves the session on success. On failure the
/// session file is not touched.
pub(crate) async fn complete(
    ctx: &AuthContext,
    session: &mut Session,
    callback_url: &str,
) -> ClientResult<Credential> {
    let credential = ctx
        .resolver
        .complete_login_into(session, callback_url)
        .await?;
    ctx.store.save(session)?;
    info!("session saved to {}", ctx.store.path().display());
    Ok(credential)
}

fn print_login_success(ctx: &AuthContext, credential: &Credential) {
    println!("Login successful.");
    if credential.refresh_token.is_none() {
        println!("Google issued no refresh token; the session ends when the access token expires.");
        return;
    }
    match ctx.persistence {
        PersistenceMode::Config => {
            println!("Refresh token saved to {}", ctx.config_path.display());
        }
        PersistenceMode::Log => {
            println!("The new refresh token was logged; copy it into refresh_token to keep it.");
        }
        PersistenceMode::Disabled => {}
    }
}

/// Deletes the session file. Needs no credentials.
pub fn logout(store: &SessionStore) -> ClientResult<()> {
    if store.clear()? {
        println!("Session removed ({}).", store.path().display());
    } else {
        println!("No session to remove.");
    }
    Ok(())
}
