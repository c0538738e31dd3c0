use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;

use resource_arbiter::domain::manager::ResourceManager;
use resource_arbiter::domain::resource_set::ResourceSetCallback;
use resource_arbiter::logger;

/// Loads a declaration file and plays a scripted acquire/release round
/// over the declared classes, printing the owner tables after every step.
#[derive(Parser)]
#[command(name = "resource-arbiter", about = "Policy-arbitrated resource manager demo")]
struct Args {
    /// Path to the JSON configuration (zones, classes, resources).
    config: String,

    /// Zone to run the demo in; defaults to the first declared zone.
    #[arg(long)]
    zone: Option<String>,

    /// Also print the class queues after every step.
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    logger::init();

    let args = Args::parse();

    let mut manager =
        resource_arbiter::manager_from_config_file(&args.config).context("loading configuration")?;

    let zone_name = match &args.zone {
        Some(name) => name.clone(),
        None => match manager.zones().iter().next() {
            Some(zone) => zone.name.clone(),
            None => bail!("the configuration declares no zones"),
        },
    };
    if manager.zones().find_by_name(&zone_name).is_none() {
        bail!("zone '{}' is not declared in the configuration", zone_name);
    }

    let resource_names: Vec<String> = manager.resources().iter().map(|d| d.name.clone()).collect();
    if resource_names.is_empty() {
        bail!("the configuration declares no resources");
    }

    let class_names: Vec<String> = manager
        .classes()
        .indexes_by_priority()
        .into_iter()
        .filter_map(|i| manager.classes().get(i).map(|c| c.name.clone()))
        .collect();
    if class_names.is_empty() {
        bail!("the configuration declares no application classes");
    }

    println!("{}", "== resource-arbiter demo ==".bold());
    println!("zone: {}\n", zone_name.cyan());

    let client = manager.create_client("demo")?;

    let on_event: ResourceSetCallback = Rc::new(|manager: &mut ResourceManager, reply_id: u32, rset_id: u32| {
        if let Some(rset) = manager.resource_set(rset_id) {
            let outcome = if rset.mask_grant != 0 {
                format!("granted 0x{:02x}", rset.mask_grant).green()
            } else {
                format!("denied (advice 0x{:02x})", rset.mask_advice).red()
            };
            println!("  set #{} reply {}: {}", rset_id, reply_id, outcome);
        }
    });

    // one set per class, every declared resource mandatory
    let mut sets = Vec::new();
    for (step, class) in class_names.iter().enumerate() {
        let priority = manager.classes().find_by_name(class).map(|c| c.priority).unwrap_or(0);
        let rset = manager.create_resource_set(client, false, false, priority, Some(on_event.clone()))?;
        for resource in &resource_names {
            manager.add_resource(rset, resource, false, &[], true)?;
        }
        manager.add_resource_set_to_class(rset, class, &zone_name, step as u32)?;
        sets.push((class.clone(), rset));
    }

    for (round, (class, rset)) in sets.iter().enumerate() {
        println!("{} class '{}' acquires set #{}", "->".bold(), class.cyan(), rset);
        manager.acquire(*rset, 100 + round as u32)?;
        print!("{}", manager.print_owners());
        if args.verbose {
            print!("{}", manager.print_classes());
        }
        println!();
    }

    for (class, rset) in sets.iter().rev() {
        println!("{} class '{}' releases set #{}", "<-".bold(), class.cyan(), rset);
        manager.release(*rset, 0)?;
    }
    print!("{}", manager.print_owners());

    manager.destroy_client(client)?;
    println!("\n{}", "demo finished".bold());

    Ok(())
}
