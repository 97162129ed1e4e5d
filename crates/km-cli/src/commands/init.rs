//! Init command — validate the API key and provision entitled plugins,
//! per §4.7.

use anyhow::{Context, Result};
use km_core::{ConfigSnapshot, KilometersHome};
use km_entitlement::Client;
use km_provisioning::{Outcome, Registry};

use crate::theme::Theme;

/// Run the install/update protocol end to end: validate the key, list
/// entitled plugins, reconcile against the local registry, and apply.
pub(crate) async fn run_init(snapshot: &ConfigSnapshot, home: &KilometersHome, force: bool) -> Result<i32> {
    let api_key = snapshot.api_key();
    if api_key.is_empty() {
        println!(
            "{}",
            Theme::error("no API key configured; set KM_API_KEY, pass --api-key, or run `km auth login`")
        );
        return Ok(1);
    }

    let client = Client::new(snapshot.api_endpoint(), api_key);

    println!("{}", Theme::info("validating API key..."));
    let subscription = match client.validate_key().await {
        Ok(s) => s,
        Err(e) => {
            println!("{}", Theme::error(&format!("entitlement check failed: {e}")));
            return Ok(2);
        }
    };
    println!(
        "{}",
        Theme::success(&format!(
            "authenticated as {} ({} tier)",
            subscription.customer_name, subscription.tier
        ))
    );

    let platform = current_platform();
    let available = client
        .list_entitled_plugins(&platform)
        .await
        .context("listing entitled plugins")?;
    let entitled = km_provisioning::tier_compatible(&subscription, available);

    let registry_path = home.registry_file();
    let registry = Registry::load_or_default(&registry_path)?;
    let plan = km_provisioning::reconcile(&entitled, &registry.installed());

    if plan.is_empty() {
        println!("{}", Theme::success("already up to date; nothing to provision"));
        return Ok(0);
    }

    if !plan.to_remove.is_empty() {
        println!("{}", Theme::warning("no longer entitled to:"));
        for p in &plan.to_remove {
            println!("  - {} {}", p.manifest.name, p.manifest.version);
        }
        let proceed = snapshot.auto_provision()
            || force
            || dialoguer::Confirm::new()
                .with_prompt("remove them?")
                .default(false)
                .interact()?;
        if proceed {
            report_outcomes(&km_provisioning::remove(&plan.to_remove, &registry_path));
        }
    }

    let plugins_dir = snapshot.plugins_dir();
    std::fs::create_dir_all(&plugins_dir).context("creating plugins directory")?;

    if !plan.to_install.is_empty() || !plan.to_update.is_empty() {
        if !snapshot.auto_provision() && !force {
            println!("{}", Theme::info("plugins to install or update:"));
            for m in plan.to_install.iter().chain(&plan.to_update) {
                println!("  - {} {}", m.name, m.version);
            }
            let proceed = dialoguer::Confirm::new()
                .with_prompt("proceed?")
                .default(true)
                .interact()?;
            if !proceed {
                println!("{}", Theme::info("aborted"));
                return Ok(0);
            }
        }

        let outcomes = km_provisioning::apply(&plan, &client, &platform, &plugins_dir, &registry_path).await;
        let any_failed = outcomes.iter().any(|o| matches!(o, Outcome::Failed { .. }));
        report_outcomes(&outcomes);

        if any_failed {
            return Ok(2);
        }
    }

    Ok(0)
}

fn report_outcomes(outcomes: &[Outcome]) {
    for outcome in outcomes {
        match outcome {
            Outcome::Installed(p) => {
                println!("{}", Theme::success(&format!("installed {} {}", p.manifest.name, p.manifest.version)));
            }
            Outcome::Updated(p) => {
                println!("{}", Theme::success(&format!("updated {} to {}", p.manifest.name, p.manifest.version)));
            }
            Outcome::Removed(name) => println!("{}", Theme::success(&format!("removed {name}"))),
            Outcome::Failed { name, error } => println!("{}", Theme::error(&format!("{name}: {error}"))),
        }
    }
}

fn current_platform() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
