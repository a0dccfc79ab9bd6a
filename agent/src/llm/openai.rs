use crate::llm;
use crate::tools::{ToolCall, ToolDefinition};
use crate::{Error, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
        ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs, Role,
    },
};
use async_trait::async_trait;
use std::sync::Arc;

/// Chat-completions backed [`llm::LLM`].
///
/// Credentials come from the usual `OPENAI_API_KEY` / `OPENAI_BASE_URL`
/// environment variables unless a config is supplied explicitly.
pub struct OpenAI {
    model: String,
    temperature: f32,
    client: Client<OpenAIConfig>,
}

impl OpenAI {
    pub fn new(model: String) -> Arc<Self> {
        Self::with_config(model, OpenAIConfig::default())
    }

    pub fn with_config(model: String, config: OpenAIConfig) -> Arc<Self> {
        Arc::new(Self {
            model,
            temperature: 0.0,
            client: Client::with_config(config),
        })
    }
}

fn tool_call_to_openai(call: &ToolCall) -> ChatCompletionMessageToolCall {
    ChatCompletionMessageToolCall {
        id: call.id.clone(),
        r#type: ChatCompletionToolType::Function,
        function: FunctionCall {
            name: call.name.clone(),
            arguments: call.args.clone(),
        },
    }
}

impl TryFrom<&llm::Message> for ChatCompletionRequestMessage {
    type Error = Error;

    fn try_from(msg: &llm::Message) -> Result<Self> {
        match msg {
            llm::Message::User(msg) => Ok(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(msg.clone()),
                    name: None,
                },
            )),
            llm::Message::System(msg) => Ok(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.clone()),
                    name: None,
                },
            )),
            llm::Message::Tool { id, result, .. } => Ok(ChatCompletionRequestMessage::Tool(
                ChatCompletionRequestToolMessage {
                    content: ChatCompletionRequestToolMessageContent::Text(result.clone()),
                    tool_call_id: id.clone(),
                },
            )),
            llm::Message::Assistant(msg, tool_calls) => {
                let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                args.content(ChatCompletionRequestAssistantMessageContent::Text(
                    msg.clone(),
                ));
                // the api rejects an empty tool_calls array
                if !tool_calls.is_empty() {
                    args.tool_calls(tool_calls.iter().map(tool_call_to_openai).collect::<Vec<_>>());
                }
                Ok(ChatCompletionRequestMessage::Assistant(args.build()?))
            }
        }
    }
}

impl TryFrom<&ToolDefinition> for ChatCompletionTool {
    type Error = Error;

    fn try_from(tool: &ToolDefinition) -> Result<Self> {
        let res = ChatCompletionToolArgs::default()
            .function(
                FunctionObjectArgs::default()
                    .name(tool.name.clone())
                    .description(tool.desc.clone())
                    .parameters(tool.params.clone())
                    .build()?,
            )
            .build()?;

        Ok(res)
    }
}

#[async_trait]
impl llm::LLM for OpenAI {
    async fn completion<'a>(
        &self,
        request: llm::CompletionRequest<'a>,
    ) -> Result<llm::CompletionResponse> {
        let mut completion = CreateChatCompletionRequestArgs::default();
        completion
            .model(&self.model)
            .temperature(self.temperature)
            .messages(
                request
                    .messages
                    .iter()
                    .map(ChatCompletionRequestMessage::try_from)
                    .collect::<Result<Vec<_>>>()?,
            );

        if !request.tools.is_empty() {
            completion.tools(
                request
                    .tools
                    .iter()
                    .map(ChatCompletionTool::try_from)
                    .collect::<Result<Vec<_>>>()?,
            );
        }

        let completion = completion.build()?;

        tracing::debug!(model = %self.model, messages = request.messages.len(), "requesting completion");
        let res = self.client.chat().create(completion).await?;

        let choice = res
            .choices
            .first()
            .ok_or(Error::LLMResponseError("choices is empty".to_string()))?;

        if choice.message.role != Role::Assistant {
            return Err(Error::LLMResponseError(
                "expected role to be assistant".to_string(),
            ));
        }

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .iter()
            .flat_map(|calls| {
                calls.iter().map(|call| ToolCall {
                    id: call.id.clone(),
                    name: call.function.name.clone(),
                    args: call.function.arguments.clone(),
                })
            })
            .collect();

        // content is legitimately absent when the model only calls tools
        let content = match (&choice.message.content, tool_calls.is_empty()) {
            (Some(content), _) => content.clone(),
            (None, false) => String::new(),
            (None, true) => {
                return Err(Error::LLMResponseError("content is empty".to_string()));
            }
        };

        Ok(llm::CompletionResponse {
            content,
            tool_calls,
        })
    }
}
