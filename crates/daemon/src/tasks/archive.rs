use super::{parse_content_key, TaskContext, TaskResult, TaskSuccess};
use crate::export::export_course;

pub async fn export_archive(ctx: &TaskContext, content_key: &str) -> TaskResult {
    let key = parse_content_key(content_key)?;
    let url = export_course(&ctx.router, ctx.executor.clone(), &ctx.packager, &key).await?;
    Ok(TaskSuccess::Completed(format!("archive of {key} uploaded to {url}")))
}
