use std::path::Path;

use anyhow::{Context, Result};

use gradeloop_types::ProjectConfig;

/// Assemble the base context document: the project system prompt followed by
/// the contents of every file in the knowledge directory, each folded in
/// under a header naming the file. Directory absence or a read failure
/// degrades to a warning message handed back to the caller; the run proceeds
/// with whatever context was loaded up to that point.
pub async fn build_base_context(
    project: &ProjectConfig,
    knowledge_dir: &Path,
) -> (String, Option<String>) {
    let mut context = format!("# System Prompt\n{}\n\n", project.system_prompt);
    let warning = match append_knowledge(&mut context, knowledge_dir).await {
        Ok(()) => None,
        Err(err) => {
            tracing::warn!(dir = %knowledge_dir.display(), error = %err, "knowledge directory unreadable");
            Some(format!(
                "Warning: knowledge directory missing or unreadable: {}",
                knowledge_dir.display()
            ))
        }
    };
    (context, warning)
}

async fn append_knowledge(context: &mut String, dir: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {:?}", dir))?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let content = tokio::fs::read_to_string(entry.path())
            .await
            .with_context(|| format!("Failed to read {:?}", entry.path()))?;
        context.push_str(&format!("## Knowledge file: {name}\n{content}\n\n"));
        tracing::debug!(file = %name, context_len = context.len(), "knowledge file loaded");
    }
    Ok(())
}
