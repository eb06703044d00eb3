// src/commands/versions.rs
//! Release listing command

use anyhow::Result;
use aura_install::config::Settings;
use aura_install::fetch::{ReleaseCatalogClient, ReleaseInfo};

pub fn cmd_versions(settings: &Settings, json: bool) -> Result<()> {
    let client = ReleaseCatalogClient::new(
        &settings.download.release_api_url,
        settings.download.local_versions_file.clone(),
        settings.api_timeout(),
        settings.download.channel_limit,
    )?;
    let catalog = client.catalog();

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    if catalog.is_empty() {
        println!("No releases available");
        return Ok(());
    }

    print_group("Releases", &catalog.releases);
    print_group("Prereleases", &catalog.prereleases);
    print_group("CI builds", &catalog.ci_builds);
    Ok(())
}

fn print_group(title: &str, releases: &[ReleaseInfo]) {
    if releases.is_empty() {
        return;
    }
    println!("{}:", title);
    for release in releases {
        match &release.published_at {
            Some(date) => println!("  {:<24} {} ({})", release.tag, release.name, date),
            None => println!("  {:<24} {}", release.tag, release.name),
        }
    }
}
