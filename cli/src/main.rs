//! `dsql-cli`: a thin runnable surface over `dsql_engine`, driving the
//! engine through its public API (never reimplementing its logic) against
//! a built-in in-memory `Account`/`Contact`/`Opportunity` dataset. Mirrors
//! the teacher's `cli` crate's pattern of a `structopt`-derived command
//! enum dispatched from `main`.

mod dataset;

use std::sync::Arc;

use dsql_engine::{Dialect, Engine, EngineConfig, FixedSecurityProvider, SecurityContext};
use structopt::StructOpt;

#[derive(StructOpt, Debug)]
#[structopt(name = "dsql-cli")]
struct Opt {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Run a query against the demo dataset and print rows as JSON.
    Query {
        dsql: String,
    },
    /// Print the plan the optimizer would produce for a query, as JSON.
    Explain {
        dsql: String,
    },
    /// Print plan/result cache statistics after exercising the demo dataset.
    Stats,
}

fn build_engine(config: EngineConfig) -> Engine {
    let meta = Arc::new(dataset::metadata());
    let mut mock = dsql_engine::driver::MockDriver::new();
    dataset::seed(&mut mock);
    let security = Arc::new(FixedSecurityProvider(SecurityContext::new("demo-user").with_role("SystemAdministrator")));
    Engine::new(config, meta.clone(), meta, security, Arc::new(mock), Dialect::Mock)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let opt = Opt::from_args();
    let engine = build_engine(EngineConfig::default());

    match opt.command {
        Command::Query { dsql } => {
            let rows = engine.query(&dsql).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Explain { dsql } => {
            let plan = engine.explain(&dsql)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Command::Stats => {
            for dsql in [
                "SELECT Id, Name FROM Account",
                "SELECT Id, Name FROM Account",
                "SELECT Id, Name, Email FROM Contact WHERE AccountId = 1",
            ] {
                let _ = engine.query(dsql).await?;
            }
            let stats = engine.cache_statistics();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
