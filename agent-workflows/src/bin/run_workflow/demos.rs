use std::{collections::HashMap, sync::Arc};

use agent_workflows::{
    Agent,
    structs::{
        evaluator_optimizer::{EvaluationCriteria, EvaluationType, EvaluatorOptimizer},
        orchestrator_workers::OrchestratorSystem,
        parallelization::{
            AggregationMethod, ParallelProcessor, ParallelizationType, Section, VotingConfig,
        },
        prompt_chaining::PromptChainer,
        routing::{RouteConfig, RouteType, WorkflowRouter},
    },
};
use anyhow::Result;
use serde_json::{Value, json};

pub type DemoOutput = (String, Value);

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn has_positive_sentiment(text: &str) -> bool {
    const POSITIVE_WORDS: [&str; 5] = ["good", "great", "excellent", "positive", "wonderful"];
    let text = text.to_lowercase();
    POSITIVE_WORDS.iter().any(|word| text.contains(word))
}

pub async fn prompt_chaining(agent: Arc<dyn Agent>) -> Result<DemoOutput> {
    let chainer = PromptChainer::new(agent);

    let sequential = chainer
        .sequential_chain(
            &strings(&[
                "Write a short story about a robot",
                "Transform the previous story into a poem",
                "Create a movie script outline based on the poem",
            ]),
            "",
        )
        .await?;

    let parallel = chainer
        .parallel_chain(
            "Explain the concept of machine learning",
            &strings(&[
                "What are the potential applications in healthcare?",
                "What are the ethical considerations?",
                "How might this impact employment?",
            ]),
        )
        .await?;

    let conditional = chainer
        .conditional_chain(
            "What do you think about the future of AI?",
            has_positive_sentiment,
            "Elaborate on these positive aspects",
            "What solutions would you propose for these concerns?",
        )
        .await?;

    // Stop once a refinement no longer grows the answer by more than 10%.
    let refinement = chainer
        .iterative_refinement_chain(
            "Explain quantum computing",
            "Make this explanation more detailed and precise",
            3,
            Some(|prev: &str, new: &str| new.len() as f64 <= prev.len() as f64 * 1.1),
        )
        .await?;

    let branches = HashMap::from([
        (
            "technical".to_owned(),
            strings(&[
                "Explain the technical architecture",
                "Discuss implementation challenges",
                "Provide code examples",
            ]),
        ),
        (
            "general".to_owned(),
            strings(&[
                "Explain in simple terms",
                "Give real-world analogies",
                "Provide practical applications",
            ]),
        ),
    ]);
    let branching = chainer
        .branching_chain("Explain how neural networks work", &branches, |response| {
            if response.to_lowercase().contains("technical") {
                "technical".to_owned()
            } else {
                "general".to_owned()
            }
        })
        .await?;

    Ok((
        "prompt chaining examples".to_owned(),
        json!({
            "sequential": sequential,
            "parallel": parallel,
            "conditional": conditional,
            "iterative_refinement": refinement,
            "branching": branching,
        }),
    ))
}

pub async fn routing(agent: Arc<dyn Agent>) -> Result<DemoOutput> {
    let mut router = WorkflowRouter::new(agent, RouteType::Single);

    router.add_route(
        RouteConfig::new(
            "technical_support",
            "Technical issues, error messages, or software/hardware problems",
            "You are a technical support specialist. Your role is to:\n1. Identify the technical issue\n2. Provide step-by-step troubleshooting\n3. Explain solutions in clear, technical but accessible language",
            "Please provide a detailed technical support response including:\n1. Problem identification\n2. Step-by-step troubleshooting steps\n3. Additional recommendations",
        )
        .confidence_threshold(0.7),
    );
    router.add_route(
        RouteConfig::new(
            "customer_service",
            "General inquiries, account issues, or policy questions",
            "You are a customer service representative. Your role is to:\n1. Address customer concerns empathetically\n2. Provide clear policy information\n3. Offer solutions that align with company policies",
            "Please provide a customer-friendly response that:\n1. Acknowledges the customer's concern\n2. Explains relevant policies\n3. Offers clear next steps",
        )
        .confidence_threshold(0.6),
    );
    router.add_route(
        RouteConfig::new(
            "sales",
            "Product inquiries, pricing questions, or purchase intentions",
            "You are a sales representative. Your role is to:\n1. Understand customer needs\n2. Explain product benefits\n3. Provide relevant pricing and purchasing information",
            "Please provide a sales-focused response that:\n1. Addresses the customer's interest\n2. Highlights relevant benefits\n3. Provides clear pricing/purchase information",
        )
        .confidence_threshold(0.6),
    );

    let input = "My laptop won't turn on after the latest update";
    let response = router.process_input(input).await?;

    Ok((
        input.to_owned(),
        json!({ "input": input, "response": response }),
    ))
}

const ANALYSIS_CONTENT: &str = "Machine learning algorithms have revolutionized data analysis. \
Neural networks can process complex patterns in datasets, \
enabling applications from image recognition to natural language processing.";

pub async fn parallelization(agent: Arc<dyn Agent>) -> Result<DemoOutput> {
    let sections = vec![
        Section::new(
            "technical_analysis",
            "You are a technical content analyst focusing on accuracy and technical depth.",
            "Analyze the technical aspects of this content:",
        ),
        Section::new(
            "readability_analysis",
            "You are a readability expert focusing on clarity and accessibility.",
            "Analyze the readability and clarity of this content:",
        )
        .weight(0.8),
        Section::new(
            "engagement_analysis",
            "You are an engagement specialist focusing on user interest and appeal.",
            "Analyze the engagement potential of this content:",
        )
        .weight(0.6),
    ];
    let sectioning = ParallelProcessor::new(Arc::clone(&agent), ParallelizationType::Sectioning)
        .process(ANALYSIS_CONTENT, Some(&sections), None)
        .await?;

    let voting_config = VotingConfig {
        prompt: "You are a content moderator. Review the following content for appropriateness."
            .to_owned(),
        variations: strings(&[
            "Focus on hate speech and discriminatory content",
            "Focus on explicit adult content or inappropriate themes",
            "Focus on potentially harmful or dangerous information",
        ]),
        threshold: 0.7,
        aggregation_method: AggregationMethod::Weighted,
    };
    let voting = ParallelProcessor::new(agent, ParallelizationType::Voting)
        .process(ANALYSIS_CONTENT, None, Some(&voting_config))
        .await?;

    Ok((
        ANALYSIS_CONTENT.to_owned(),
        json!({ "sectioning": sectioning, "voting": voting }),
    ))
}

pub async fn orchestration(agent: Arc<dyn Agent>) -> Result<DemoOutput> {
    let task = "Add input validation to the user registration form in our web app.
The form should validate:
- Email format
- Password strength (min 8 chars, numbers, special chars)
- Username (alphanumeric, 3-20 chars)
Update both frontend validation and backend API validation.";

    let report = OrchestratorSystem::new(agent).process_task(task).await?;
    Ok((task.to_owned(), serde_json::to_value(report)?))
}

pub async fn evaluator_optimizer(agent: Arc<dyn Agent>) -> Result<DemoOutput> {
    let optimizer = EvaluatorOptimizer::builder(agent)
        .eval_type(EvaluationType::Translation)
        .add_criterion(EvaluationCriteria::new(
            "accuracy",
            "Accuracy of meaning translation",
            1.0,
        ))
        .add_criterion(EvaluationCriteria::new(
            "fluency",
            "Natural flow in target language",
            0.8,
        ))
        .add_criterion(EvaluationCriteria::new(
            "cultural_adaptation",
            "Appropriate cultural context adaptation",
            0.6,
        ))
        .max_iterations(3)
        .target_score(0.9)
        .build();

    let task = "Translate the following English text to French, maintaining the professional tone:
'Our innovative approach to artificial intelligence combines cutting-edge technology
with ethical considerations, ensuring responsible development of AI solutions.'";

    let report = optimizer.optimize(task, None).await;
    Ok((task.to_owned(), serde_json::to_value(report)?))
}
