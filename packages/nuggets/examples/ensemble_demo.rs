//! Ensemble and two-phase extraction against scripted providers.
//!
//! Run with `cargo run -p nuggets --example ensemble_demo`. Set
//! `NUGGETS_CONFIG` to a JSON file to override defaults, and `RUST_LOG` to
//! change verbosity.

use std::sync::Arc;

use nuggets::pipeline::prompts::{format_extract_prompt, format_high_recall_prompt};
use nuggets::testing::{MockEmbedder, MockProvider, MockRun};
use nuggets::{
    BoundaryMatcher, ConsensusBuilder, ContentReconstructor, EmbeddingCache, FragmentPair,
    NuggetConfig, NuggetType, RawExtraction, ResilientProvider, SimilarityMatcher,
    TwoPhaseCoordinator,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PAGE: &str = "Most productivity advice is noise. The \u{201C}two-minute rule\u{201D} \
    says that if a task takes less than two minutes, do it now. Deferring it \
    costs more in tracking than in doing. Think of your inbox as a kitchen \
    sink: rinse plates as you go and the pile never forms.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nuggets=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NuggetConfig::from_env()?;
    let matcher = Arc::new(BoundaryMatcher::new(config.boundary.clone()));

    // Locate a fragment pair with straight quotes against the curly-quoted page.
    let pair = FragmentPair::new("The \"two-minute rule\" says", "do it now.");
    let located = matcher.find_boundary(&pair, PAGE);
    println!(
        "[{}] {:.2} {:?}",
        located.strategy(),
        located.confidence(),
        located.matched_text()
    );

    // Three runs that partly agree.
    let rule = RawExtraction::with_fragments(NuggetType::Tool, "The \"two-minute rule\"", "do it now");
    let sink = RawExtraction::with_fragments(NuggetType::Analogy, "Think of your inbox", "never forms");
    let provider = ResilientProvider::new(
        MockProvider::new()
            .with_run(vec![rule.clone(), sink.clone()])
            .with_failure("rate limited")
            .with_run(vec![rule.clone()])
            .with_run(vec![rule.clone()]),
        config.retry.clone().with_base_delay_ms(10),
    );

    let cache = Arc::new(EmbeddingCache::new(config.cache.clone()));
    let similarity = SimilarityMatcher::with_cache(Arc::new(MockEmbedder::new()), cache.clone());
    let builder = ConsensusBuilder::new(similarity);
    let reconstructor = ContentReconstructor::new(matcher.clone());

    let prompt = format_extract_prompt(config.ensemble.selected_types.as_deref());
    let ensemble = builder
        .extract_with_ensemble(PAGE, &prompt, &provider, &config.ensemble)
        .await;

    for nugget in &ensemble.nuggets {
        let text = reconstructor.reconstruct_extraction(Some(&nugget.nugget), Some(PAGE));
        println!(
            "{:.2} ({}/{} runs) [{}] {}",
            nugget.confidence,
            nugget.supporting_runs,
            nugget.total_runs,
            nugget.nugget.nugget_type,
            text
        );
    }
    println!("{}", serde_json::to_string_pretty(&ensemble.metadata)?);
    println!("embedding cache hit rate: {:.2}", cache.stats().hit_rate());

    // Two-phase: one confident passage, one weak one.
    let provider = MockProvider::new().with_high_recall(MockRun::ok(vec![
        RawExtraction::with_full_content(
            NuggetType::Explanation,
            "Deferring it costs more in tracking than in doing.",
        )
        .with_confidence(0.93),
        RawExtraction::with_full_content(NuggetType::Tool, "Most productivity advice is noise.")
            .with_confidence(0.2),
    ]));
    let coordinator = TwoPhaseCoordinator::new(matcher, ConsensusBuilder::default());
    let prompt = format_high_recall_prompt(None);
    let result = coordinator
        .extract_with_two_phase(PAGE, &prompt, &provider, &config.two_phase)
        .await;

    for nugget in &result.nuggets {
        println!(
            "{:.2} via {:?}: {}",
            nugget.confidence, nugget.boundary_source, nugget.content
        );
    }
    println!("{}", serde_json::to_string_pretty(&result.metadata)?);

    Ok(())
}
