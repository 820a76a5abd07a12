use std::sync::Arc;

use crate::agent::llm::create_llm_client;
use crate::agent::{CodeAgent, LlmCodeAgent, LlmReviewerAgent, ReviewerAgent, ReviewerSettings};
use crate::config::AppConfig;
use crate::error::Result;
use crate::platform::github::GitHubHost;
use crate::platform::SourceControlHost;
use crate::workflow::Orchestrator;
use crate::workspace::WorkspaceManager;

/// The collaborators a workflow run needs, built once from configuration.
#[derive(Clone)]
pub struct Services {
    pub host: Arc<dyn SourceControlHost>,
    pub code_agent: Arc<dyn CodeAgent>,
    pub reviewer: Arc<dyn ReviewerAgent>,
    pub max_iterations: u32,
}

impl Services {
    pub fn new(
        host: Arc<dyn SourceControlHost>,
        code_agent: Arc<dyn CodeAgent>,
        reviewer: Arc<dyn ReviewerAgent>,
        max_iterations: u32,
    ) -> Self {
        Self {
            host,
            code_agent,
            reviewer,
            max_iterations,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let host: Arc<dyn SourceControlHost> = Arc::new(GitHubHost::new(&config.github)?);
        let llm = create_llm_client(&config.llm)?;
        let publisher = Arc::new(WorkspaceManager::new(
            &config.workspace,
            config.github_token(),
        ));

        let code_agent = Arc::new(LlmCodeAgent::new(
            host.clone(),
            llm.clone(),
            publisher,
            config.agent.code_agent_timeout(),
        ));
        let reviewer = Arc::new(LlmReviewerAgent::new(
            host.clone(),
            llm.clone(),
            ReviewerSettings::from(&config.agent),
        ));

        tracing::info!(
            provider = ?config.llm.provider,
            model = llm.model(),
            max_iterations = config.agent.max_iterations,
            "Services initialized"
        );

        Ok(Self::new(
            host,
            code_agent,
            reviewer,
            config.agent.max_iterations,
        ))
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.host.clone(),
            self.code_agent.clone(),
            self.reviewer.clone(),
            self.max_iterations,
        )
    }
}
