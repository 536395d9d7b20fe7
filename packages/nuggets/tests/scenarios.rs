//! End-to-end behavior of boundary matching and ensemble consensus.
//!
//! Covers the canonical cases:
//! 1. Hallucinated punctuation on an otherwise exact fragment
//! 2. Pairwise-overlapping runs
//! 3. Every run failing
//! 4. A single run
//! 5. Paraphrased fragments located by word similarity

mod common;

use std::sync::Arc;

use common::{init_tracing, passage, ARTICLE};
use nuggets::testing::{MockEmbedder, MockProvider};
use nuggets::{
    BoundaryMatcher, ConsensusBuilder, ContentReconstructor, EnsembleOptions, FragmentPair,
    MatchStrategy, NuggetType, SimilarityMatcher, SimilarityMethod, SimilarityOptions,
};

fn lexical(runs: usize) -> EnsembleOptions {
    EnsembleOptions::default()
        .with_runs(runs)
        .with_similarity(SimilarityOptions::lexical())
}

#[test]
fn test_exact_match_ignores_hallucinated_punctuation() {
    init_tracing();
    let source = "We ran the study twice. How do we explain these observations? \
                  Nobody had a good answer.";
    let pair = FragmentPair::new("How do we explain", "these observations.\"");

    let result = BoundaryMatcher::default().find_boundary(&pair, source);

    assert!(result.is_success());
    assert_eq!(result.strategy(), MatchStrategy::Exact);
    let text = result.matched_text().unwrap();
    assert!(text.contains("these observations"));

    let span = result.span().unwrap();
    assert_eq!(&source[span.start_index..span.end_index], text);
}

#[tokio::test]
async fn test_pairwise_overlapping_runs() {
    init_tracing();
    let n1 = passage(NuggetType::Explanation, "Communication paths grow quadratically with headcount");
    let n2 = passage(NuggetType::Analogy, "a highway doesn't get faster by adding cars");
    let n3 = passage(NuggetType::Model, "smaller teams with clear interfaces between them");

    let provider = MockProvider::new()
        .with_run(vec![n1.clone(), n2.clone()])
        .with_run(vec![n1.clone(), n3.clone()])
        .with_run(vec![n2.clone(), n3.clone()]);

    let result = ConsensusBuilder::default()
        .extract_with_ensemble(ARTICLE, "prompt", &provider, &lexical(3))
        .await;

    assert_eq!(result.nuggets.len(), 3);
    for nugget in &result.nuggets {
        assert!((nugget.confidence - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(nugget.supporting_runs, 2);
        assert_eq!(nugget.total_runs, 3);
    }
    // Equal confidences keep first-seen order.
    assert_eq!(result.nuggets[0].nugget, n1);
    assert_eq!(result.nuggets[1].nugget, n2);
    assert_eq!(result.nuggets[2].nugget, n3);

    assert_eq!(result.metadata.consensus_reached, 3);
    // Six fragments collapsed into three groups.
    assert_eq!(result.metadata.duplicates_removed, 3);
    assert_eq!(result.metadata.similarity_method, SimilarityMethod::WordOverlap);
}

#[tokio::test]
async fn test_all_runs_failing_yields_empty_result() {
    init_tracing();
    let provider = MockProvider::new()
        .with_failure("quota exceeded")
        .with_failure("quota exceeded")
        .with_failure("quota exceeded");

    let result = ConsensusBuilder::default()
        .extract_with_ensemble(ARTICLE, "prompt", &provider, &lexical(3))
        .await;

    assert!(result.nuggets.is_empty());
    assert_eq!(result.metadata.consensus_reached, 0);
    assert_eq!(result.metadata.duplicates_removed, 0);
    assert_eq!(result.metadata.failed_runs, 3);
    assert_eq!(result.metadata.successful_runs, 0);
    assert_eq!(result.metadata.average_response_time_ms, 0);
}

#[tokio::test]
async fn test_single_run_is_fully_confident() {
    init_tracing();
    let provider = MockProvider::new().with_run(vec![
        passage(NuggetType::Explanation, "adding people to a late project makes it later"),
        passage(NuggetType::Analogy, "a highway doesn't get faster by adding cars"),
    ]);

    let result = ConsensusBuilder::default()
        .extract_with_ensemble(ARTICLE, "prompt", &provider, &lexical(1))
        .await;

    assert_eq!(result.nuggets.len(), 2);
    for nugget in &result.nuggets {
        assert_eq!(nugget.confidence, 1.0);
        assert_eq!(nugget.supporting_runs, 1);
        assert_eq!(nugget.total_runs, 1);
    }
}

#[test]
fn test_paraphrased_fragments_fall_back_to_fuzzy() {
    init_tracing();
    let source = "Background first. The experiment clearly shows that the results \
                  were truly remarkable indeed. Then more text follows.";
    let pair = FragmentPair::new(
        "the experiment clearly demonstrates that",
        "results were quite remarkable indeed",
    );

    let result = BoundaryMatcher::default().find_boundary(&pair, source);

    assert!(result.is_success());
    assert_eq!(result.strategy(), MatchStrategy::Fuzzy);
    assert!(result.confidence() > 0.0 && result.confidence() < 1.0);
}

#[tokio::test]
async fn test_embedding_consensus_then_reconstruction() {
    init_tracing();
    let brooks = "adding people to a late project makes it later";
    let reworded = "adding more people to a late project delays it";
    let highway = "a highway doesn't get faster by adding cars";

    let embedder = Arc::new(
        MockEmbedder::new()
            .with_dimensions(3)
            .with_vector(brooks, vec![1.0, 0.0, 0.0])
            .with_vector(reworded, vec![0.95, 0.1, 0.0])
            .with_vector(highway, vec![0.0, 0.0, 1.0]),
    );
    let provider = MockProvider::new()
        .with_run(vec![passage(NuggetType::Explanation, brooks)])
        .with_run(vec![passage(NuggetType::Explanation, reworded)])
        .with_run(vec![passage(NuggetType::Analogy, highway)]);

    let builder = ConsensusBuilder::new(SimilarityMatcher::new(embedder));
    let options = EnsembleOptions::default().with_runs(3);
    let result = builder
        .extract_with_ensemble(ARTICLE, "prompt", &provider, &options)
        .await;

    assert_eq!(result.metadata.similarity_method, SimilarityMethod::Embedding);
    assert_eq!(result.nuggets.len(), 2);
    assert_eq!(result.nuggets[0].run_ids, vec![0, 1]);

    // The winning passage is located in the article from its outer words.
    let top = result.nuggets[0].nugget.full_text().unwrap();
    let pair = FragmentPair::from_full_content(top, 3);
    assert_eq!(pair, FragmentPair::new("adding people to", "makes it later"));
    let shown = ContentReconstructor::default().reconstruct(&pair, ARTICLE);
    assert_eq!(shown, brooks);
}
