use std::sync::{Arc, RwLock};

use clap::Parser;

mod app;
mod cli;
mod config;
mod eid;
mod extract;
mod files;
mod genai;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use config::Config;
use files::{FileCategory, FileQuery};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = cli::Args::parse();

    let base_path = app::base_path();
    let config = Arc::new(RwLock::new(Config::load_with(&base_path)?));
    let mut app_mgr = app::App::new(config.clone(), &base_path)?;

    match args.command {
        cli::Command::Daemon { listen } => {
            app_mgr.run_queue();
            web::start_daemon(app_mgr, &listen);
            Ok(())
        }

        cli::Command::Add {
            path,
            org,
            user,
            name,
            category,
        } => {
            let data = std::fs::read(&path)?;
            let name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.to_string_lossy().to_string())
            });
            let category = category
                .as_deref()
                .map(str::parse::<FileCategory>)
                .transpose()?;

            app_mgr.run_queue();
            let record = app_mgr.upload(app::UploadRequest {
                name,
                org_id: org,
                user_id: user,
                category,
                data,
            })?;
            println!("{}", serde_json::to_string_pretty(&record)?);

            // drain the queue so the embedding runs before we exit
            app_mgr.shutdown();
            app_mgr.wait_task_queue_finish();
            Ok(())
        }

        cli::Command::Search { org, query } => {
            let hits = app_mgr.search_semantic(&org, &query)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }

        cli::Command::List {
            org,
            keyword,
            deleted,
        } => {
            let records = app_mgr.search_files(FileQuery {
                org_id: Some(org),
                keyword,
                deleted_only: deleted,
                ..Default::default()
            })?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }

        cli::Command::Backfill {} => {
            app_mgr.run_queue();
            let scheduled = app_mgr.backfill()?;
            println!("scheduled {scheduled} embedding tasks");

            app_mgr.shutdown();
            app_mgr.wait_task_queue_finish();
            Ok(())
        }

        cli::Command::Retry { id } => {
            app_mgr.run_queue();
            app_mgr.schedule_retry(id);

            app_mgr.shutdown();
            app_mgr.wait_task_queue_finish();
            Ok(())
        }

        cli::Command::Purge {} => {
            let purged = app_mgr.purge_deleted()?;
            println!("purged {purged} files");
            Ok(())
        }
    }
}
