//! Command handlers on top of the core session and API client.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bandmanager_core::auth::{Navigator, SessionStatus};
use bandmanager_core::models::{
    MusicBand, MusicBandFilter, MusicGenre, PageRequest, SortDirection, User,
};
use bandmanager_core::{ApiClient, AuthService, Config, CredentialStore};
use serde::Serialize;
use tracing::debug;

use crate::ListArgs;

/// Tells the user to sign in again once the session is gone.
struct ReloginNotice;

impl Navigator for ReloginNotice {
    fn redirect_to_login(&self) {
        eprintln!("Your session has expired. Run `bandmanager login` to sign in again.");
    }
}

pub struct App {
    config: Config,
    auth: AuthService,
    json: bool,
}

impl App {
    pub fn new(api_url: Option<String>, json: bool) -> Result<Self> {
        let mut config = Config::load()?;
        if let Some(url) = api_url {
            config.api_url = url;
        }
        debug!(api_url = %config.api_url, storage = ?config.storage, "Loaded config");

        let store = Arc::new(CredentialStore::open(config.open_storage()?)?);
        let api = ApiClient::with_timeout(
            &config.api_url,
            store,
            Arc::new(ReloginNotice),
            Duration::from_secs(config.request_timeout_secs),
        )?;

        Ok(Self {
            config,
            auth: AuthService::new(api),
            json,
        })
    }

    pub async fn login(&mut self, username: Option<String>) -> Result<()> {
        let username = match username {
            Some(name) => name,
            None => self.prompt_username()?,
        };
        let password = prompt_password()?;

        println!("Authenticating...");
        let user = self.auth.login(&username, &password).await?;
        self.remember_username(&user.username)?;

        println!("Signed in as {}", user.username);
        Ok(())
    }

    pub async fn register(&mut self, username: String) -> Result<()> {
        let password = prompt_password()?;
        let confirm = rpassword::prompt_password("Confirm password: ")?;
        if password != confirm {
            bail!("Passwords do not match");
        }

        let user = self.auth.register(&username, &password).await?;
        self.remember_username(&user.username)?;

        println!("Account created, signed in as {}", user.username);
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        self.auth.logout().await?;
        println!("Signed out");
        Ok(())
    }

    pub async fn status(&self) -> Result<()> {
        match self.auth.check_auth_status().await? {
            SessionStatus::SignedIn(user) => {
                if self.json {
                    return self.print_json(&user);
                }
                println!("Signed in as {}", user.username);
            }
            SessionStatus::SignedOut => {
                if self.json {
                    println!("null");
                } else {
                    println!("Not signed in");
                }
            }
        }
        Ok(())
    }

    pub async fn whoami(&self) -> Result<()> {
        let user = self.require_user().await?;
        let permissions = self.auth.permissions(&user).await;

        if self.json {
            #[derive(Serialize)]
            struct WhoAmI<'a> {
                user: &'a User,
                permissions: Vec<&'a str>,
            }
            return self.print_json(&WhoAmI {
                user: &user,
                permissions: permissions.iter().map(String::as_str).collect(),
            });
        }

        println!("User:     {} (id {})", user.username, user.id);
        if let Some(created) = user.created_at {
            println!("Since:    {}", created.format("%Y-%m-%d"));
        }
        println!("Admin:    {}", if user.is_admin() { "yes" } else { "no" });
        println!("Permissions:");
        for permission in &permissions {
            println!("  {}", permission);
        }
        Ok(())
    }

    pub async fn list_bands(&self, args: ListArgs) -> Result<()> {
        let filter = MusicBandFilter {
            name: args.name,
            genre: args.genre.as_deref().map(parse_genre).transpose()?,
            ..Default::default()
        };
        let page = PageRequest {
            page: args.page,
            size: args.size,
            sort: args.sort,
            direction: args.desc.then_some(SortDirection::Desc),
        };

        let result = self.api().list_music_bands(&filter, &page).await?;
        if self.json {
            return self.print_json(&result);
        }

        if result.content.is_empty() {
            println!("No bands found");
            return Ok(());
        }
        println!("{:>6}  {:<30} {:<12} {:>7}  {}", "ID", "NAME", "GENRE", "MEMBERS", "ESTABLISHED");
        for band in &result.content {
            println!(
                "{:>6}  {:<30} {:<12} {:>7}  {}",
                band.id,
                truncate(&band.name, 30),
                band.genre_display(),
                band.number_of_participants
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                band.establishment_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            );
        }
        println!(
            "Page {} of {} ({} bands)",
            result.number + 1,
            result.total_pages.max(1),
            result.total_elements
        );
        Ok(())
    }

    pub async fn show_band(&self, id: i64) -> Result<()> {
        let band = self.api().get_music_band(id).await?;
        if self.json {
            return self.print_json(&band);
        }
        print_band(&band);
        Ok(())
    }

    pub async fn delete_band(&self, id: i64) -> Result<()> {
        self.api().delete_music_band(id).await?;
        println!("Deleted band {}", id);
        Ok(())
    }

    fn api(&self) -> &ApiClient {
        self.auth.api()
    }

    async fn require_user(&self) -> Result<User> {
        match self.auth.check_auth_status().await? {
            SessionStatus::SignedIn(user) => Ok(user),
            SessionStatus::SignedOut => bail!("Not signed in. Run `bandmanager login` first."),
        }
    }

    fn remember_username(&mut self, username: &str) -> Result<()> {
        self.config.last_username = Some(username.to_string());
        self.config.save().context("Failed to save config")
    }

    fn prompt_username(&self) -> Result<String> {
        match self.config.last_username {
            Some(ref last_user) => print!("Username [{}]: ", last_user),
            None => print!("Username: "),
        }
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim();

        match (input.is_empty(), &self.config.last_username) {
            (true, Some(last_user)) => Ok(last_user.clone()),
            (true, None) => bail!("Username required"),
            (false, _) => Ok(input.to_string()),
        }
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password required");
    }
    Ok(password)
}

/// Accepts `punk-rock`, `punk_rock` or `PUNK_ROCK`.
fn parse_genre(raw: &str) -> Result<MusicGenre> {
    let name = raw.trim().to_uppercase().replace('-', "_");
    serde_json::from_value(serde_json::Value::String(name))
        .with_context(|| format!("Unknown genre '{}'", raw))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn print_band(band: &MusicBand) {
    println!("{} (id {})", band.name, band.id);
    println!("  Genre:        {}", band.genre_display());
    if let Some(ref description) = band.description {
        println!("  Description:  {}", description);
    }
    if let Some(ref coordinates) = band.coordinates {
        println!("  Coordinates:  ({}, {})", coordinates.x, coordinates.y);
    }
    if let Some(n) = band.number_of_participants {
        println!("  Members:      {}", n);
    }
    if let Some(n) = band.singles_count {
        println!("  Singles:      {}", n);
    }
    if let Some(n) = band.albums_count {
        println!("  Albums:       {}", n);
    }
    if let Some(ref album) = band.best_album {
        println!("  Best album:   {}", album.name);
    }
    if let Some(ref front_man) = band.front_man {
        println!("  Front man:    {}", front_man.name);
    }
    if let Some(date) = band.establishment_date {
        println!("  Established:  {}", date.format("%Y-%m-%d"));
    }
    if let Some(ref owner) = band.created_by {
        println!("  Created by:   {}", owner);
    }
    if let Some(created) = band.created_date {
        println!("  Created:      {}", created.format("%Y-%m-%d %H:%M"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_genre_accepts_cli_spellings() {
        assert_eq!(parse_genre("punk-rock").unwrap(), MusicGenre::PunkRock);
        assert_eq!(parse_genre("POST_PUNK").unwrap(), MusicGenre::PostPunk);
        assert_eq!(parse_genre(" soul ").unwrap(), MusicGenre::Soul);
        assert!(parse_genre("polka").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Black Sabbath", 30), "Black Sabbath");
        assert_eq!(truncate("Godspeed You! Black Emperor", 10), "Godspeed …");
    }
}
