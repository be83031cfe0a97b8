use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use edu_sense::{
    analysis::{AnalysisResult, GapDetector},
    args::Args,
    attempts::load_attempts,
    config::EngineConfig,
    logging,
    recommend::{Recommendation, RecommendationEngine},
    report::{render_recommendations, render_summary, write_report, write_report_in},
};

#[derive(Serialize)]
struct JsonOutput<'a> {
    analysis: &'a AnalysisResult,
    recommendations: &'a [Recommendation],
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(top) = args.top {
        config.recommender.max_recommendations = top;
        config.validate()?;
    }

    let _guard = logging::init(&config.logging)?;

    let attempts = load_attempts(&args.input)?;

    let analysis = GapDetector::new(config.detector).analyze(&attempts);
    let recommendations = RecommendationEngine::new(config.recommender).generate(&analysis);

    if let Some(path) = &args.report {
        write_report(&analysis, path)?;
    } else if let Some(dir) = &args.report_dir {
        let path = write_report_in(&analysis, dir)?;
        eprintln!("report written to {}", path.display());
    }

    if args.json {
        let out = JsonOutput {
            analysis: &analysis,
            recommendations: &recommendations,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    print!("{}", render_summary(&analysis));
    println!("\nRecommended actions:");
    print!("{}", render_recommendations(&recommendations));

    Ok(())
}
