//! Plugin management commands — explicit provisioning outside of `init`.

use anyhow::{bail, Context, Result};
use km_core::{ConfigSnapshot, KilometersHome};
use km_entitlement::Client;
use km_provisioning::{Outcome, Plan, Registry};

use crate::theme::Theme;

/// `plugins list`: the locally installed plugins, from the registry.
pub(crate) fn list(home: &KilometersHome) -> Result<i32> {
    let registry = Registry::load_or_default(&home.registry_file())?;
    let installed = registry.installed();

    if installed.is_empty() {
        println!("{}", Theme::info("no plugins installed"));
        return Ok(0);
    }

    println!("{}", Theme::header("installed plugins"));
    println!("{}", Theme::separator());
    for plugin in installed {
        println!(
            "  {:<24} {:<10} {} {}",
            plugin.manifest.name,
            plugin.manifest.version.to_string(),
            Theme::dimmed(&plugin.manifest.required_tier.to_string()),
            Theme::dimmed(&plugin.installed_at.format("%Y-%m-%d %H:%M").to_string()),
        );
    }
    Ok(0)
}

/// `plugins install <name>`: install one entitled plugin not yet installed.
pub(crate) async fn install(snapshot: &ConfigSnapshot, home: &KilometersHome, name: &str) -> Result<i32> {
    let client = authenticated_client(snapshot)?;
    let platform = current_platform();
    let subscription = client.validate_key().await.context("validating API key")?;
    let available = client
        .list_entitled_plugins(&platform)
        .await
        .context("listing entitled plugins")?;
    let entitled = km_provisioning::tier_compatible(&subscription, available);

    let Some(manifest) = entitled.iter().find(|m| m.name == name) else {
        println!("{}", Theme::error(&format!("{name} is not entitled at your subscription tier")));
        return Ok(2);
    };

    let registry_path = home.registry_file();
    let registry = Registry::load_or_default(&registry_path)?;
    if registry.plugins().contains_key(name) {
        println!("{}", Theme::info(&format!("{name} is already installed; use `plugins update` instead")));
        return Ok(0);
    }

    let plugins_dir = snapshot.plugins_dir();
    std::fs::create_dir_all(&plugins_dir).context("creating plugins directory")?;

    let plan = Plan {
        to_install: vec![manifest.clone()],
        ..Plan::default()
    };
    let outcomes = km_provisioning::apply(&plan, &client, &platform, &plugins_dir, &registry_path).await;
    report_outcomes(&outcomes)
}

/// `plugins update [name]`: update one plugin, or every out-of-date plugin
/// if no name is given.
pub(crate) async fn update(snapshot: &ConfigSnapshot, home: &KilometersHome, name: Option<&str>) -> Result<i32> {
    let client = authenticated_client(snapshot)?;
    let platform = current_platform();
    let subscription = client.validate_key().await.context("validating API key")?;
    let available = client
        .list_entitled_plugins(&platform)
        .await
        .context("listing entitled plugins")?;
    let entitled = km_provisioning::tier_compatible(&subscription, available);

    let registry_path = home.registry_file();
    let registry = Registry::load_or_default(&registry_path)?;
    let mut plan = km_provisioning::reconcile(&entitled, &registry.installed());
    plan.to_install.clear();
    plan.to_remove.clear();

    if let Some(name) = name {
        plan.to_update.retain(|m| m.name == name);
        if plan.to_update.is_empty() {
            println!("{}", Theme::info(&format!("{name} is already up to date or not installed")));
            return Ok(0);
        }
    } else if plan.to_update.is_empty() {
        println!("{}", Theme::success("all plugins are up to date"));
        return Ok(0);
    }

    let plugins_dir = snapshot.plugins_dir();
    let outcomes = km_provisioning::apply(&plan, &client, &platform, &plugins_dir, &registry_path).await;
    report_outcomes(&outcomes)
}

/// `plugins remove <name>`: uninstall a plugin after confirmation.
pub(crate) fn remove(home: &KilometersHome, name: &str, force: bool) -> Result<i32> {
    let registry_path = home.registry_file();
    let registry = Registry::load_or_default(&registry_path)?;
    let Some(installed) = registry.plugins().get(name).cloned() else {
        println!("{}", Theme::error(&format!("{name} is not installed")));
        return Ok(1);
    };

    if !force {
        let confirm = dialoguer::Confirm::new()
            .with_prompt(format!("remove {name}?"))
            .default(false)
            .interact()?;
        if !confirm {
            println!("{}", Theme::info("aborted"));
            return Ok(0);
        }
    }

    let outcomes = km_provisioning::remove(std::slice::from_ref(&installed), &registry_path);
    report_outcomes(&outcomes)
}

fn report_outcomes(outcomes: &[Outcome]) -> Result<i32> {
    let mut any_failed = false;
    for outcome in outcomes {
        match outcome {
            Outcome::Installed(p) => {
                println!("{}", Theme::success(&format!("installed {} {}", p.manifest.name, p.manifest.version)));
            }
            Outcome::Updated(p) => {
                println!("{}", Theme::success(&format!("updated {} to {}", p.manifest.name, p.manifest.version)));
            }
            Outcome::Removed(name) => println!("{}", Theme::success(&format!("removed {name}"))),
            Outcome::Failed { name, error } => {
                println!("{}", Theme::error(&format!("{name}: {error}")));
                any_failed = true;
            }
        }
    }
    Ok(if any_failed { 2 } else { 0 })
}

fn authenticated_client(snapshot: &ConfigSnapshot) -> Result<Client> {
    if snapshot.api_key().is_empty() {
        bail!("no API key configured; run `km auth login` first");
    }
    Ok(Client::new(snapshot.api_endpoint(), snapshot.api_key()))
}

fn current_platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
