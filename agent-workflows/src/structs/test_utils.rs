use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::{self, BoxFuture};
use mockall::mock;

use crate::agent::{Agent, AgentError, GenerationOptions};

mock! {
    /// Mock Agent
    pub Agent {}

    impl Agent for Agent {
        fn generate(
            &self,
            prompt: String,
            options: GenerationOptions,
        ) -> BoxFuture<'static, Result<String, AgentError>>;
        fn name(&self) -> String;
    }
}

/// An agent whose reply is computed from the prompt.
pub fn scripted_agent<F>(respond: F) -> Arc<dyn Agent>
where
    F: Fn(&str) -> Result<String, AgentError> + Send + 'static,
{
    let mut agent = MockAgent::new();
    agent.expect_name().return_const("mock-agent".to_owned());
    agent
        .expect_generate()
        .returning(move |prompt, _| Box::pin(future::ready(respond(&prompt))));
    Arc::new(agent)
}

/// An agent that always answers `response`.
pub fn create_mock_agent(response: &str) -> Arc<dyn Agent> {
    let response = response.to_owned();
    scripted_agent(move |_| Ok(response.clone()))
}

pub fn create_failing_agent(error_msg: &str) -> Arc<dyn Agent> {
    let error_msg = error_msg.to_owned();
    scripted_agent(move |_| Err(AgentError::TestError(error_msg.clone())))
}

/// An agent that sleeps on every call and records the peak number of calls in flight.
pub fn delayed_agent<F>(delay: Duration, respond: F) -> (Arc<dyn Agent>, Arc<AtomicUsize>)
where
    F: Fn(&str) -> Result<String, AgentError> + Send + Sync + 'static,
{
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let respond = Arc::new(respond);

    let mut agent = MockAgent::new();
    agent.expect_name().return_const("delayed-agent".to_owned());
    let peak_clone = Arc::clone(&peak);
    agent.expect_generate().returning(move |prompt, _| {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak_clone);
        let respond = Arc::clone(&respond);
        Box::pin(async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            respond(&prompt)
        })
    });
    (Arc::new(agent), peak)
}
