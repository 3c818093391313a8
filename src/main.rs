use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::LevelFilter;
use structopt::StructOpt;

use ccallgraph::formatters::format_report_as_json;
use ccallgraph::{AnalysisInput, CallGraphAnalyzer};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ccallgraph",
    about = "Analyze recursion, externals and argument flow in an extracted C/C++ call graph"
)]
struct Opt {
    /// Input JSON document (functions, calls, optional cfgs and config)
    #[structopt(parse(from_os_str))]
    input: PathBuf,

    /// Output file
    #[structopt(parse(from_os_str), short, long)]
    output: Option<PathBuf>,

    /// Output format (json or dot)
    #[structopt(short, long, default_value = "json")]
    format: String,

    /// Cap for the indirect recursion depth walk
    #[structopt(long)]
    max_depth: Option<usize>,

    /// Outgoing-call count above which a function is highlighted
    #[structopt(long)]
    fan_out_threshold: Option<usize>,

    /// Enable debug logging
    #[structopt(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if opt.debug {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let content = fs::read_to_string(&opt.input)
        .with_context(|| format!("Failed to read file: {:?}", opt.input))?;
    let input = AnalysisInput::from_json(&content)
        .with_context(|| format!("Failed to parse analysis input: {:?}", opt.input))?;

    let mut config = input.config.unwrap_or_default();
    if let Some(depth) = opt.max_depth {
        config = config.with_max_indirect_depth(depth);
    }
    if let Some(threshold) = opt.fan_out_threshold {
        config = config.with_high_fan_out_threshold(threshold);
    }

    let mut graph = input.build_call_graph().context("Invalid call graph")?;
    let cfgs = input.build_cfg_map().context("Invalid control-flow graphs")?;
    let analyzer = CallGraphAnalyzer::new(config);

    let output = match opt.format.as_str() {
        "json" => {
            let report = analyzer.analyze(&mut graph, &cfgs);
            format_report_as_json(&report).context("Failed to serialize report")?
        }
        "dot" => {
            analyzer.identify_external_functions(&mut graph);
            analyzer.mark_recursive_functions(&mut graph);
            analyzer.export_dot(&graph, Some(&cfgs))
        }
        other => anyhow::bail!("Unknown output format: {} (expected json or dot)", other),
    };

    // Write to file or stdout
    if let Some(output_path) = opt.output {
        fs::write(&output_path, output)
            .with_context(|| format!("Failed to write to file: {:?}", output_path))?;
        println!("Analysis written to {:?}", output_path);
    } else {
        println!("{}", output);
    }

    Ok(())
}
