use clap::Parser;

/// Run a reactive node topology: links, fireable queues and a compute
/// scheduler, until Ctrl-C or the optional duration elapses.
///
/// Rules are not hosted by this worker. The rule dispatch loop
/// (`ripple_rules::RuleDispatcher`) needs an expression engine, which the
/// embedding application supplies.
#[derive(Parser, Debug)]
#[command(name = "ripple-worker", version, about)]
pub struct CliArgs {
    /// Topology file (TOML) describing nodes, fireables, scheduler and links.
    #[arg(long, env = "RIPPLE_TOPOLOGY")]
    pub topology: String,

    /// Runtime config file (TOML). Without it, settings come from RIPPLE_* env vars.
    #[arg(long, env = "RIPPLE_CONFIG")]
    pub config: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    pub duration_secs: Option<u64>,
}
