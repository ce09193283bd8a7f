pub mod azure;
pub mod openai;

use serde_json::{json, Value};

use nl2sql_core::config::OpenAiConfig;

use crate::provider::{LlmError, LlmProvider, Message};

/// Hosts served by Azure OpenAI rather than the public OpenAI API.
const AZURE_HOST_MARKERS: &[&str] = &[".openai.azure.com", ".cognitiveservices.azure.com"];

/// Create the chat provider for the configured endpoint. `mini` selects the
/// smaller completion deployment used for rewriting and schema selection.
pub fn create_provider(config: &OpenAiConfig, mini: bool) -> Result<Box<dyn LlmProvider>, LlmError> {
    let endpoint = config
        .endpoint
        .as_deref()
        .ok_or_else(|| LlmError::NotConfigured("OpenAI__Endpoint not set".into()))?;
    let api_key = config
        .api_key
        .clone()
        .ok_or_else(|| LlmError::NotConfigured("OpenAI__ApiKey not set".into()))?;
    let deployment = if mini {
        config.mini_completion_deployment.clone()
    } else {
        config.completion_deployment.clone()
    };

    if is_azure_endpoint(endpoint) {
        Ok(Box::new(azure::AzureOpenAiProvider::new(
            endpoint.to_string(),
            api_key,
            deployment,
            config.api_version.clone(),
        )))
    } else {
        Ok(Box::new(openai::OpenAiProvider::new(
            api_key,
            deployment,
            endpoint.to_string(),
        )))
    }
}

fn is_azure_endpoint(endpoint: &str) -> bool {
    let lower = endpoint.to_lowercase();
    AZURE_HOST_MARKERS.iter().any(|m| lower.contains(m))
}

/// Chat completions request body shared by both APIs.
fn chat_body(messages: &[Message], temperature: f32, max_tokens: u32) -> Value {
    let api_messages: Vec<Value> = messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    json!({
        "messages": api_messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

async fn read_completion(response: reqwest::Response) -> Result<String, LlmError> {
    let status = response.status().as_u16();
    if status != 200 {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::ApiError { status, body });
    }

    let resp: Value = response.json().await?;
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| LlmError::ParseError("missing choices[0].message.content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: Option<&str>) -> OpenAiConfig {
        OpenAiConfig {
            endpoint: endpoint.map(str::to_string),
            api_key: Some("key".into()),
            api_version: "2024-08-01-preview".into(),
            completion_deployment: "gpt-4o".into(),
            mini_completion_deployment: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-ada-002".into(),
            embedding_deployment: "embed".into(),
            embedding_dimensions: 1536,
            temperature: 0.0,
            max_tokens: 512,
        }
    }

    #[test]
    fn azure_endpoint_detection() {
        assert!(is_azure_endpoint("https://my-res.openai.azure.com/"));
        assert!(is_azure_endpoint("https://x.cognitiveservices.azure.com"));
        assert!(!is_azure_endpoint("https://api.openai.com"));
    }

    #[test]
    fn picks_deployment_by_size() {
        let c = config(Some("https://my-res.openai.azure.com"));
        assert_eq!(create_provider(&c, false).unwrap().model(), "gpt-4o");
        assert_eq!(create_provider(&c, true).unwrap().model(), "gpt-4o-mini");

        let c = config(Some("https://api.openai.com"));
        assert_eq!(create_provider(&c, true).unwrap().model(), "gpt-4o-mini");
    }

    #[test]
    fn missing_endpoint_is_not_configured() {
        assert!(matches!(
            create_provider(&config(None), false),
            Err(LlmError::NotConfigured(_))
        ));
    }

    #[test]
    fn body_uses_lowercase_roles() {
        let body = chat_body(&[Message::system("s"), Message::user("u")], 0.0, 10);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "u");
        assert_eq!(body["max_tokens"], 10);
    }
}
