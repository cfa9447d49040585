//! The Simple strategy (§4.5): send the initial prompt, then forward tool
//! results until the provider stops requesting tools.

use super::{ExecuteResponse, Strategy, StrategyOutcome, StrategyState};
use crate::error::Result;
use crate::value::Input;
use async_trait::async_trait;

/// Terminates as soon as a turn produces no function calls, returning that
/// turn's texts.
#[derive(Debug, Default)]
pub struct SimpleStrategy {
    init_input: Vec<Input>,
}

impl SimpleStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Strategy for SimpleStrategy {
    async fn init(&mut self, initial_inputs: &[Input]) -> Result<()> {
        self.init_input = initial_inputs.to_vec();
        Ok(())
    }

    async fn handle(&mut self, state: StrategyState<'_>) -> Result<StrategyOutcome> {
        if state.iteration == 0 {
            return Ok(StrategyOutcome::Continue(state.init_input.to_vec()));
        }

        let last = state
            .last_response
            .expect("iteration > 0 always carries a last_response");

        if !last.has_function_calls() {
            return Ok(StrategyOutcome::Terminal(ExecuteResponse {
                texts: last.texts.clone(),
            }));
        }

        Ok(StrategyOutcome::Continue(state.next_input.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::History;
    use crate::session::Session;
    use crate::value::{FunctionCall, Response};
    use futures::stream::Stream;
    use std::pin::Pin;

    struct NullSession;

    #[async_trait]
    impl Session for NullSession {
        async fn generate_content(&mut self, _inputs: Vec<Input>) -> Result<Response> {
            unimplemented!("not exercised by these unit tests")
        }

        async fn generate_stream(
            &mut self,
            _inputs: Vec<Input>,
        ) -> Result<Pin<Box<dyn Stream<Item = Response> + Send>>> {
            unimplemented!()
        }

        fn history(&self) -> History {
            History::new("test")
        }
    }

    struct NullClient;

    #[async_trait]
    impl crate::session::LLMClient for NullClient {
        async fn new_session(
            &self,
            _options: crate::session::SessionOptions,
        ) -> Result<Box<dyn Session>> {
            Ok(Box::new(NullSession))
        }

        async fn count_tokens(&self, _history: &History) -> Result<u32> {
            Ok(0)
        }

        fn is_compatible_history(&self, _history: &History) -> Result<()> {
            Ok(())
        }
    }

    fn state<'a>(
        iteration: u32,
        init_input: &'a [Input],
        next_input: &'a [Input],
        last_response: Option<&'a Response>,
        session: &'a mut dyn Session,
        history: &'a History,
        llm_client: &'a dyn crate::session::LLMClient,
    ) -> StrategyState<'a> {
        StrategyState {
            iteration,
            init_input,
            next_input,
            last_response,
            session,
            tools: &[],
            system_prompt: None,
            history,
            llm_client,
            max_iterations: 32,
        }
    }

    #[tokio::test]
    async fn test_iteration_zero_returns_init_input() {
        let mut strategy = SimpleStrategy::new();
        let init = vec![Input::text("Add 5 and 3")];
        strategy.init(&init).await.unwrap();

        let mut session = NullSession;
        let client = NullClient;
        let history = History::new("test");
        let outcome = strategy
            .handle(state(0, &init, &[], None, &mut session, &history, &client))
            .await
            .unwrap();
        match outcome {
            StrategyOutcome::Continue(inputs) => assert_eq!(inputs.len(), 1),
            _ => panic!("expected Continue"),
        }
    }

    #[tokio::test]
    async fn test_terminates_when_no_function_calls_s1() {
        let mut strategy = SimpleStrategy::new();
        let init = vec![Input::text("Add 5 and 3")];
        strategy.init(&init).await.unwrap();

        let mut session = NullSession;
        let client = NullClient;
        let history = History::new("test");
        let last = Response::text_only(vec!["The result is 8.".to_string()]);
        let outcome = strategy
            .handle(state(
                1,
                &init,
                &[],
                Some(&last),
                &mut session,
                &history,
                &client,
            ))
            .await
            .unwrap();
        match outcome {
            StrategyOutcome::Terminal(resp) => {
                assert_eq!(resp.texts, vec!["The result is 8.".to_string()])
            }
            _ => panic!("expected Terminal"),
        }
    }

    #[tokio::test]
    async fn test_continues_with_next_input_when_function_calls_present() {
        let mut strategy = SimpleStrategy::new();
        let init = vec![Input::text("Add 5 and 3")];
        strategy.init(&init).await.unwrap();

        let mut session = NullSession;
        let client = NullClient;
        let history = History::new("test");
        let last = Response {
            texts: vec![],
            function_calls: vec![FunctionCall {
                id: "1".into(),
                name: "add".into(),
                arguments: Default::default(),
            }],
            input_tokens: 0,
            output_tokens: 0,
            error: None,
        };
        let next = vec![Input::function_response(
            "1",
            "add",
            serde_json::json!({"result": 8}),
            None,
        )];
        let outcome = strategy
            .handle(state(
                1,
                &init,
                &next,
                Some(&last),
                &mut session,
                &history,
                &client,
            ))
            .await
            .unwrap();
        match outcome {
            StrategyOutcome::Continue(inputs) => assert_eq!(inputs.len(), 1),
            _ => panic!("expected Continue"),
        }
    }
}
