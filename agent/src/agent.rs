use crate::llm::{self, Message};
use crate::tools;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub trait StopCondition {
    fn done(&self, history: &[llm::Message]) -> bool;
}

type Tool = Box<dyn tools::Tool + Send>;

const DEFAULT_MAX_STEPS: usize = 8;

const NO_TOOL_CALL_NUDGE: &str =
    "You did not call a tool. Respond by calling one of the provided tools.";

pub struct Agent {
    llm: Arc<dyn llm::LLM + Send + Sync>,
    tools: HashMap<String, Tool>,
    tool_defs: Vec<tools::ToolDefinition>,
    stop_condition: Box<dyn StopCondition + Send>,
    max_steps: usize,
}

impl Agent {
    async fn execute_tool_call(
        &mut self,
        tool_call: &tools::ToolCall,
        messages: Vec<llm::Message>,
    ) -> Result<Vec<llm::Message>> {
        let tool = self
            .tools
            .get_mut(&tool_call.name)
            .ok_or(Error::ToolDoesNotExist(tool_call.name.clone()))?;

        tracing::debug!(tool = %tool_call.name, id = %tool_call.id, "invoking tool");
        tool.invoke(tool_call, messages).await
    }

    /// Runs completion/tool rounds until the stop condition holds.
    ///
    /// Every round counts against `max_steps`; hitting the limit is an
    /// error rather than a truncated history.
    pub async fn run(&mut self, mut messages: Vec<llm::Message>) -> Result<Vec<Message>> {
        let mut step = 0;

        while !self.stop_condition.done(&messages) {
            if step == self.max_steps {
                return Err(Error::StepLimitExceeded(self.max_steps));
            }
            step += 1;

            let next = self
                .llm
                .completion(llm::CompletionRequest {
                    messages: &messages,
                    tools: &self.tool_defs,
                })
                .await?;

            tracing::debug!(step, tool_calls = next.tool_calls.len(), "agent step");

            let nudge = next.tool_calls.is_empty() && !self.tool_defs.is_empty();

            messages.push(llm::Message::Assistant(
                next.content,
                next.tool_calls.clone(),
            ));

            for tool_call in &next.tool_calls {
                messages = self.execute_tool_call(tool_call, messages).await?;
            }

            if nudge && !self.stop_condition.done(&messages) {
                messages.push(llm::Message::User(NO_TOOL_CALL_NUDGE.to_string()));
            }
        }

        Ok(messages)
    }
}

pub struct AgentBuilder {
    llm: Option<Arc<dyn llm::LLM + Send + Sync>>,
    tools: Vec<Tool>,
    stop_condition: Option<Box<dyn StopCondition + Send>>,
    max_steps: usize,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            tools: Vec::new(),
            stop_condition: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn llm(mut self, llm: Arc<dyn llm::LLM + Send + Sync>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn stop_condition(mut self, cond: Box<dyn StopCondition + Send>) -> Self {
        self.stop_condition = Some(cond);
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let mut tool_defs = Vec::new();
        let mut tools = HashMap::new();

        for tool in self.tools {
            let def = tool.definition()?;
            tools.insert(def.name.clone(), tool);
            tool_defs.push(def);
        }

        Ok(Agent {
            llm: self
                .llm
                .ok_or(Error::MissingArg("llm is required for agent".to_string()))?,
            tools,
            tool_defs,
            stop_condition: self.stop_condition.ok_or(Error::MissingArg(
                "stop_condition is required for agent".to_string(),
            ))?,
            max_steps: self.max_steps,
        })
    }
}
