//! Minimal end-to-end parameter search against a stubbed evaluator.
//!
//! Run with: `cargo run -p sg-optimizer --example parameter_search`

use serde_json::{json, Value};
use sg_eval::{EvaluationRequest, FnEvaluator};
use sg_optimizer::{
    optimize_parameter, OptimizationRequest, OptimizerConfig, ParameterSearchSpace,
    TracingReporter,
};
use sg_types::{ChatMessage, ChatPrompt, Dataset, PromptInput, SgResult};

fn main() -> SgResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let prompt = PromptInput::Single(
        ChatPrompt::new("qa")
            .with_message(ChatMessage::system("Answer the question concisely."))
            .with_message(ChatMessage::user("{question}"))
            .with_model("gpt-4o-mini"),
    );

    let dataset = Dataset::new(
        "qa-dev",
        vec![
            json!({"question": "What is the capital of France?", "answer": "Paris"}),
            json!({"question": "What is 2 + 2?", "answer": "4"}),
        ],
    );

    let space = ParameterSearchSpace::from_json(&json!({
        "temperature": {"type": "float", "min": 0.0, "max": 1.0},
        "max_tokens": {"type": "int", "min": 32, "max": 512},
        "style": {"type": "categorical", "values": ["terse", "verbose"]},
    }))?;

    // Stand-in for the real LLM-backed evaluator: low temperature and the
    // terse style score best.
    let evaluator = FnEvaluator(|request: &EvaluationRequest<'_>| {
        let prompt = request.prompts.values().next().expect("one prompt");
        let temperature = prompt
            .model_kwargs
            .get("temperature")
            .and_then(Value::as_f64)
            .unwrap_or(0.7);
        let style_bonus = match prompt.model_kwargs.get("style").and_then(Value::as_str) {
            Some("terse") => 0.2,
            _ => 0.0,
        };
        Ok((1.0 - temperature) * 0.8 + style_bonus)
    });

    let config = OptimizerConfig::new("parameter-search-demo")
        .with_max_trials(12)
        .with_perfect_score(0.99)
        .with_seed(7);

    let request = OptimizationRequest::new(&prompt, &dataset, "accuracy");
    let result = optimize_parameter(config, space, &request, &evaluator, &TracingReporter)?;

    println!("optimizer:      {}", result.optimizer);
    println!("initial score:  {:.4}", result.initial_score);
    println!("best score:     {:.4}", result.score);
    println!("rounds:         {}", result.history.len());
    println!(
        "details:        {}",
        serde_json::to_string_pretty(&Value::Object(result.details.clone()))
            .unwrap_or_default()
    );
    Ok(())
}
