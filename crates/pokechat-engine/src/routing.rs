use regex::{Regex, RegexBuilder};

use pokechat_core::messages::{latest_user_content, Message};
use pokechat_core::provider::ToolChoice;

use crate::error::RoutingError;

/// Picks the tool-selection hint sent with each backend request.
pub trait ToolRouter: Send + Sync {
    fn choose_tool(&self, history: &[Message]) -> ToolChoice;
}

/// Lets the model decide every time.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoRouter;

impl ToolRouter for AutoRouter {
    fn choose_tool(&self, _history: &[Message]) -> ToolChoice {
        ToolChoice::Auto
    }
}

/// Matches the latest user message against keyword families, in order.
/// The first family that matches forces its tool. Best effort only: the
/// model may still answer without calling it.
#[derive(Debug)]
pub struct KeywordRouter {
    rules: Vec<(Regex, String)>,
    fallback: ToolChoice,
}

impl KeywordRouter {
    pub fn new<I, P, T>(rules: I, fallback: ToolChoice) -> Result<Self, RoutingError>
    where
        I: IntoIterator<Item = (P, T)>,
        P: AsRef<str>,
        T: Into<String>,
    {
        let rules = rules
            .into_iter()
            .map(|(pattern, tool)| {
                let pattern = pattern.as_ref();
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RoutingError::InvalidPattern {
                        pattern: pattern.to_string(),
                        source,
                    })?;
                Ok((regex, tool.into()))
            })
            .collect::<Result<Vec<_>, RoutingError>>()?;
        Ok(Self { rules, fallback })
    }
}

impl ToolRouter for KeywordRouter {
    fn choose_tool(&self, history: &[Message]) -> ToolChoice {
        let Some(text) = latest_user_content(history) else {
            return self.fallback.clone();
        };
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(text))
            .map(|(_, tool)| ToolChoice::tool(tool.as_str()))
            .unwrap_or_else(|| self.fallback.clone())
    }
}
