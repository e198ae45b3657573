use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::generator::conversation::Conversation;
use crate::generator::research::ResearchOutcome;
use crate::graph::serializer;

pub const REPORT_FILE: &str = "report.md";
pub const GRAPH_FILE: &str = "research_graph.json";
pub const CONVERSATION_FILE: &str = "conversation.json";

/// 一次研究需要输出的全部产物
pub struct ResearchArtifacts<'a> {
    pub outcome: &'a ResearchOutcome,
    pub conversation: Option<&'a Conversation>,
}

pub trait Outlet {
    async fn save(&self, artifacts: &ResearchArtifacts<'_>) -> Result<()>;
}

/// 写入输出目录：报告、研究图，以及可选的追问对话
pub struct DiskOutlet {
    output_dir: PathBuf,
}

impl DiskOutlet {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Outlet for DiskOutlet {
    async fn save(&self, artifacts: &ResearchArtifacts<'_>) -> Result<()> {
        println!("\n🖊️ 研究结果存储中...");
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .context(format!("Failed to create output dir: {:?}", self.output_dir))?;

        let report_path = self.output_dir.join(REPORT_FILE);
        tokio::fs::write(&report_path, &artifacts.outcome.final_report)
            .await
            .context(format!("Failed to write report: {:?}", report_path))?;
        println!("💾 已保存报告: {}", report_path.display());

        let graph_path = self.output_dir.join(GRAPH_FILE);
        serializer::save_to_file(&artifacts.outcome.graph, &graph_path).await?;
        println!("💾 已保存研究图: {}", graph_path.display());

        if let Some(conversation) = artifacts.conversation {
            let conversation_path = self.output_dir.join(CONVERSATION_FILE);
            conversation.save_to_file(&conversation_path).await?;
            println!("💾 已保存追问对话: {}", conversation_path.display());
        }

        println!("💾 保存完成，输出目录: {}", self.output_dir.display());
        Ok(())
    }
}

// Include tests
#[cfg(test)]
mod tests;
