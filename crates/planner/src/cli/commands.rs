//! # CLI Layer
//!
//! The CLI layer is the **only** place in the codebase that:
//! - Knows about terminal I/O (stdout, stderr)
//! - Installs the log subscriber
//! - Owns the async runtime
//! - Formats output for human consumption
//!
//! Each invocation is one short-lived screen: it builds a sync surface per
//! resource, loads (cache first), applies the requested mutation and closes the
//! surface, which flushes anything still queued before the process exits.

use super::render::{self, Row};
use super::setup::{
    CacheCommands, Cli, Commands, GoalCommands, ListArgs, NoteCommands, ProfileCommands,
    ProgramCommands,
};
use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use plannerapp::cache::fs_backend::FsBackend;
use plannerapp::cache::CacheKey;
use plannerapp::commands::{LoadOutcome, SyncReport};
use plannerapp::init::{initialize, session_from_env, PlannerContext};
use plannerapp::model::{
    FieldPatch, Goal, Note, PageQuery, ProfileFields, RecordId, SavedProgram, Schema,
};
use plannerapp::remote::http::HttpRemote;
use plannerapp::sync::ResourceSync;
use plannerapp::view::RecordState;
use tracing::debug;
use tracing_subscriber::EnvFilter;

type Surface<S> = ResourceSync<S, HttpRemote, FsBackend>;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let ctx = initialize(&cwd, session_from_env())?;
    debug!(
        base_url = %ctx.config.base_url(),
        cache_dir = %ctx.cache_dir().display(),
        config_files = ?ctx.config_files,
        signed_in = ctx.session.is_authenticated(),
        "context ready"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(dispatch(cli.command, &ctx))
}

/// Logs go to stderr; `RUST_LOG` overrides the default levels.
fn init_tracing(verbose: bool) {
    let default = if verbose {
        "planner=debug,plannerapp=debug"
    } else {
        "planner=warn,plannerapp=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(command: Commands, ctx: &PlannerContext) -> Result<()> {
    match command {
        Commands::Goals { action } => goals(action, ctx).await,
        Commands::Notes { action } => notes(action, ctx).await,
        Commands::Programs { action } => programs(action, ctx).await,
        Commands::Profile { action } => profile(action, ctx).await,
        Commands::Cache { action } => cache(action, ctx),
    }
}

async fn goals(action: GoalCommands, ctx: &PlannerContext) -> Result<()> {
    match action {
        GoalCommands::List {
            list,
            category,
            status,
        } => {
            let mut query = list_query(&list);
            if let Some(category) = category {
                query = query.with_category(category);
            }
            if let Some(status) = status {
                query = query.with_status(status.wire());
            }
            list_records::<Goal>(ctx, query, &list).await
        }
        GoalCommands::Add {
            title,
            category,
            description,
            due,
        } => {
            let mut goal = Goal::new(title.join(" "), category);
            goal.description = description;
            goal.due_date = due;
            add(ctx, goal).await
        }
        GoalCommands::Edit {
            id,
            title,
            category,
            status,
            description,
            due,
        } => {
            let mut patch = FieldPatch::new();
            if let Some(title) = title {
                patch.insert("title", title);
            }
            if let Some(category) = category {
                patch.insert("category", category);
            }
            if let Some(status) = status {
                patch.insert("status", status.wire());
            }
            if let Some(description) = description {
                patch.insert("description", description);
            }
            if let Some(due) = due {
                patch.insert("dueDate", due.to_string());
            }
            edit::<Goal>(ctx, &id, patch).await
        }
        GoalCommands::Rm { ids } => remove::<Goal>(ctx, ids).await,
    }
}

async fn notes(action: NoteCommands, ctx: &PlannerContext) -> Result<()> {
    match action {
        NoteCommands::List { list } => list_records::<Note>(ctx, list_query(&list), &list).await,
        NoteCommands::Add { text, student } => {
            let mut note = Note::new(text.join(" "));
            note.student_id = student;
            add(ctx, note).await
        }
        NoteCommands::Edit { id, text } => {
            edit::<Note>(ctx, &id, FieldPatch::new().set("text", text.join(" "))).await
        }
        NoteCommands::Rm { ids } => remove::<Note>(ctx, ids).await,
    }
}

async fn programs(action: ProgramCommands, ctx: &PlannerContext) -> Result<()> {
    match action {
        ProgramCommands::List { list } => {
            list_records::<SavedProgram>(ctx, list_query(&list), &list).await
        }
        ProgramCommands::Add {
            name,
            institution,
            url,
        } => {
            let mut program = SavedProgram::new(name.join(" "));
            program.institution = institution;
            program.url = url;
            add(ctx, program).await
        }
        ProgramCommands::Edit {
            id,
            name,
            institution,
            url,
        } => {
            let mut patch = FieldPatch::new();
            if let Some(name) = name {
                patch.insert("name", name);
            }
            if let Some(institution) = institution {
                patch.insert("institution", institution);
            }
            if let Some(url) = url {
                patch.insert("url", url);
            }
            edit::<SavedProgram>(ctx, &id, patch).await
        }
        ProgramCommands::Rm { ids } => remove::<SavedProgram>(ctx, ids).await,
    }
}

async fn profile(action: ProfileCommands, ctx: &PlannerContext) -> Result<()> {
    let mut surface = ctx.resource::<ProfileFields>();
    let outcome = surface.load(PageQuery::new()).await;
    warn_if_degraded(ctx, outcome);

    match action {
        ProfileCommands::Show => {
            match surface.records().next() {
                Some(record) => print!("{}", render::render_profile(record)),
                None => println!("No profile yet. Start one with `planner profile set firstName=...`."),
            }
            Ok(())
        }
        ProfileCommands::Set { fields } => {
            let patch = fields
                .into_iter()
                .fold(FieldPatch::new(), |patch, (field, value)| patch.set(field, value));
            let existing = surface.records().next().map(|r| r.id.clone());
            match existing {
                Some(id) => surface.edit(&id, patch)?,
                // The server may already hold a profile we could not see.
                None if outcome == LoadOutcome::Degraded => {
                    bail!("could not load the profile; nothing was changed")
                }
                None => {
                    surface.create(patch.apply(&ProfileFields::default())?)?;
                }
            }
            finish(surface, "Profile saved").await
        }
    }
}

fn cache(action: CacheCommands, ctx: &PlannerContext) -> Result<()> {
    match action {
        CacheCommands::Status => {
            let entries = ctx.cache.summaries()?;
            print!(
                "{}",
                render::render_cache_status(ctx.cache_dir(), &entries, Utc::now())
            );
        }
        CacheCommands::Clear => {
            let removed = ctx.cache.clear()?;
            let noun = if removed == 1 { "entry" } else { "entries" };
            println!("Cleared {} cached {}", removed, noun);
        }
    }
    Ok(())
}

// --- Shared flows ---

fn list_query(list: &ListArgs) -> PageQuery {
    let mut query = PageQuery::new();
    if let Some(search) = &list.search {
        query = query.with_search(search.clone());
    }
    if let Some(limit) = list.limit {
        query = query.with_limit(limit);
    }
    query
}

async fn list_records<S: Schema>(
    ctx: &PlannerContext,
    query: PageQuery,
    list: &ListArgs,
) -> Result<()> {
    if list.refresh {
        ctx.cache.invalidate(&CacheKey::new(S::KIND, &query))?;
    }
    let mut surface = ctx.resource::<S>();
    let mut outcome = surface.load(query).await;
    while list.all
        && surface.view().has_more()
        && matches!(outcome, LoadOutcome::Cache | LoadOutcome::Remote)
    {
        outcome = surface.load_more().await;
    }
    warn_if_degraded(ctx, outcome);

    let rows: Vec<Row<'_, S>> = surface
        .records()
        .map(|record| Row {
            state: surface
                .state(&record.id)
                .unwrap_or(RecordState::Confirmed),
            record,
        })
        .collect();
    print!("{}", render::render_list(&rows, surface.view().has_more()));
    Ok(())
}

async fn add<S: Schema>(ctx: &PlannerContext, fields: S) -> Result<()> {
    let mut surface = ctx.resource::<S>();
    surface.create(fields)?;
    let report = surface.close().await;
    conclude(report)
}

async fn edit<S: Schema>(ctx: &PlannerContext, id: &str, patch: FieldPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("nothing to change; pass at least one field");
    }
    let id = RecordId::new(id);
    let mut surface = ctx.resource::<S>();
    locate(&mut surface, &id).await?;
    surface.edit(&id, patch)?;
    let message = format!("Updated {} {}", S::KIND.label(), id);
    finish(surface, &message).await
}

async fn remove<S: Schema>(ctx: &PlannerContext, ids: Vec<String>) -> Result<()> {
    let mut surface = ctx.resource::<S>();
    let mut report = SyncReport::default();
    for id in ids {
        let id = RecordId::new(id);
        locate(&mut surface, &id).await?;
        report.absorb(surface.remove(&id).await?);
    }
    report.absorb(surface.close().await);
    conclude(report)
}

/// Close the surface and print `done` when everything it held was saved.
async fn finish<S: Schema>(mut surface: Surface<S>, done: &str) -> Result<()> {
    let report = surface.close().await;
    if report.is_clean() && !report.confirmed.is_empty() {
        println!("{}", console::style(done).green());
    }
    conclude(report)
}

fn conclude(report: SyncReport) -> Result<()> {
    render::print_messages(&report.messages);
    if !report.is_clean() {
        let count = report.failed.len();
        bail!(
            "{} {} could not be saved",
            count,
            if count == 1 { "change" } else { "changes" }
        );
    }
    Ok(())
}

/// Page through the resource until `id` is shown. A stale cache gets one refetch.
async fn locate<S: Schema>(surface: &mut Surface<S>, id: &RecordId) -> Result<()> {
    let mut outcome = surface.load(PageQuery::new()).await;
    if outcome == LoadOutcome::Cache && surface.record(id).is_none() {
        outcome = surface.refresh().await;
    }
    loop {
        if surface.record(id).is_some() {
            return Ok(());
        }
        if outcome == LoadOutcome::Degraded {
            bail!(
                "could not reach the planner service to look up {} {}",
                S::KIND.label(),
                id
            );
        }
        if !surface.view().has_more() {
            bail!("no {} with id {}", S::KIND.label(), id);
        }
        outcome = surface.load_more().await;
    }
}

fn warn_if_degraded(ctx: &PlannerContext, outcome: LoadOutcome) {
    if outcome != LoadOutcome::Degraded {
        return;
    }
    let text = if ctx.session.is_authenticated() {
        "Could not reach the planner service; showing cached results."
    } else {
        "Not signed in (set PLANNER_USER); showing cached results."
    };
    eprintln!("{}", console::style(text).yellow());
}
