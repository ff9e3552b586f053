use std::future::Future;
use std::io::Write;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, instrument, warn};

use crate::ads::{AdManager, PlaceholderAds};
use crate::calendar::CalendarCursor;
use crate::cli::{Command, EventFields, ExpenseCommand, ParticipantCommand, PlanCommand, ThemeCommand};
use crate::config::Config;
use crate::dates::{self, parse_date_expr};
use crate::error::{ShukinError, ShukinResult};
use crate::layout::layout;
use crate::model::calendar_events;
use crate::purchases::{LocalPurchaseService, PurchaseError, SubscriptionManager};
use crate::render::Renderer;
use crate::routes::{self, Route, Screen};
use crate::state::{
    AppState, EventPatch, ExpensePatch, NewEvent, NewExpense, NewParticipant, ParticipantPatch,
};

/// Wall-clock inputs for one invocation, fixed up front so every command in
/// it agrees on "now" and "today".
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl Clock {
    pub fn system(tz: Tz) -> Self {
        Self {
            now: Utc::now(),
            today: dates::today(tz),
        }
    }
}

pub fn command_name(command: &Command) -> &'static str {
    match command {
        Command::List => "list",
        Command::Show { .. } => "show",
        Command::Add { .. } => "add",
        Command::Edit { .. } => "edit",
        Command::Delete { .. } => "delete",
        Command::Move { .. } => "move",
        Command::Participant(_) => "participant",
        Command::Expense(_) => "expense",
        Command::Calendar { .. } => "calendar",
        Command::Plan { .. } => "plan",
        Command::Open { .. } => "open",
        Command::Theme { .. } => "theme",
        Command::Help => "help",
        Command::Version => "version",
    }
}

#[instrument(skip_all, fields(command = command_name(&command)))]
pub fn dispatch<W: Write>(
    state: &mut AppState,
    cfg: &Config,
    renderer: &Renderer,
    clock: &Clock,
    command: Command,
    out: &mut W,
) -> anyhow::Result<()> {
    debug!(?command, "dispatching command");

    match command {
        Command::List => cmd_list(state, cfg, renderer, out),
        Command::Show { id } => {
            cmd_open(state, cfg, renderer, clock, &Route::EventDetail(id).path(), out)
        }
        Command::Add { name, fields } => cmd_add(state, cfg, renderer, clock, name, fields, out),
        Command::Edit {
            id,
            name,
            fields,
            clear_start,
            clear_end,
        } => {
            let patch = EventPatch {
                name,
                description: fields.description,
                creation_date: fields.date,
                collection_start_date: date_patch(fields.start.as_deref(), clear_start, clock.today)?,
                collection_end_date: date_patch(fields.end.as_deref(), clear_end, clock.today)?,
            };
            let event = applied(renderer, out, state.update_event(&id, patch))?;
            writeln!(out, "Updated event {}.", event.name)?;
            Ok(())
        }
        Command::Delete { id } => {
            let event = applied(renderer, out, state.delete_event(&id))?;
            writeln!(out, "Deleted event {}.", event.name)?;
            Ok(())
        }
        Command::Move { id, index } => {
            applied(renderer, out, state.move_event(&id, index))?;
            renderer.write_event_table(out, state.events())
        }
        Command::Participant(action) => cmd_participant(state, renderer, clock, action, out),
        Command::Expense(action) => cmd_expense(state, renderer, action, out),
        Command::Calendar { view, date, offset } => {
            let view = view.unwrap_or_else(|| cfg.calendar_view());
            let reference = date
                .as_deref()
                .map(|raw| parse_date_expr(raw, clock.today))
                .transpose()?
                .unwrap_or(clock.today);
            let mut cursor = CalendarCursor::new(reference, view);
            cursor.shift(offset);
            cmd_calendar(state, cfg, renderer, clock, cursor, out)
        }
        Command::Plan { action } => cmd_plan(state, cfg, renderer, clock, action.unwrap_or(PlanCommand::Show), out),
        Command::Open { path } => cmd_open(state, cfg, renderer, clock, &path, out),
        Command::Theme { action } => {
            if action == Some(ThemeCommand::Toggle) {
                applied(renderer, out, state.toggle_theme())?;
            }
            writeln!(out, "{}", state.theme().as_key())?;
            Ok(())
        }
        Command::Help => {
            renderer.write_how_to(out)?;
            writeln!(out)?;
            writeln!(out, "Run `shukin --help` for every command and option.")?;
            Ok(())
        }
        Command::Version => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
    }
}

/// Turns a rejected command into a user-facing notice. Limit rejections are
/// printed as a notice rather than bubbled as a raw error.
fn applied<T, W: Write>(renderer: &Renderer, out: &mut W, result: ShukinResult<T>) -> anyhow::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(err @ ShukinError::LimitExceeded { .. }) => {
            renderer.write_notice(out, &err.to_string())?;
            Err(anyhow!("no changes were made"))
        }
        Err(err) => Err(err.into()),
    }
}

fn date_arg(raw: Option<&str>, today: NaiveDate) -> anyhow::Result<Option<NaiveDate>> {
    raw.map(|value| parse_date_expr(value, today)).transpose()
}

fn date_patch(raw: Option<&str>, clear: bool, today: NaiveDate) -> anyhow::Result<Option<Option<NaiveDate>>> {
    if clear {
        return Ok(Some(None));
    }
    Ok(date_arg(raw, today)?.map(Some))
}

fn text_patch(value: Option<String>, clear: bool) -> Option<Option<String>> {
    if clear { Some(None) } else { value.map(Some) }
}

fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(fut))
}

fn ad_manager(cfg: &Config, state: &AppState) -> AdManager<PlaceholderAds> {
    let mut ads = AdManager::new(PlaceholderAds::default(), cfg.ad_retry()).with_enabled(cfg.ads_enabled());
    ads.set_premium(state.subscription().is_premium());
    ads
}

fn show_banner<W: Write>(state: &AppState, cfg: &Config, renderer: &Renderer, out: &mut W) -> anyhow::Result<()> {
    let mut ads = ad_manager(cfg, state);
    let shown = block_on(async { ads.initialize().await && ads.show_banner().await })?;
    if shown && ads.service().banner_visible() {
        renderer.write_ad_banner(out)?;
    }
    Ok(())
}

#[instrument(skip_all)]
fn cmd_list<W: Write>(state: &AppState, cfg: &Config, renderer: &Renderer, out: &mut W) -> anyhow::Result<()> {
    renderer.write_event_table(out, state.events())?;
    show_banner(state, cfg, renderer, out)
}

#[instrument(skip_all, fields(name = %name))]
fn cmd_add<W: Write>(
    state: &mut AppState,
    cfg: &Config,
    renderer: &Renderer,
    clock: &Clock,
    name: String,
    fields: EventFields,
    out: &mut W,
) -> anyhow::Result<()> {
    let input = NewEvent {
        name,
        description: fields.description.unwrap_or_default(),
        creation_date: fields.date,
        collection_start_date: date_arg(fields.start.as_deref(), clock.today)?,
        collection_end_date: date_arg(fields.end.as_deref(), clock.today)?,
    };
    let event = applied(renderer, out, state.create_event(input, clock.today))?;
    writeln!(out, "Created event {} ({}).", event.name, event.id)?;

    let mut ads = ad_manager(cfg, state);
    block_on(async {
        if ads.initialize().await && ads.prepare_interstitial().await {
            ads.show_interstitial().await;
        }
    })?;
    Ok(())
}

#[instrument(skip_all)]
fn cmd_participant<W: Write>(
    state: &mut AppState,
    renderer: &Renderer,
    clock: &Clock,
    action: ParticipantCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    match action {
        ParticipantCommand::Add {
            event,
            name,
            owed,
            contact,
            due,
        } => {
            let input = NewParticipant {
                name,
                contact,
                amount_owed: Some(owed),
                payment_due_date: date_arg(due.as_deref(), clock.today)?,
            };
            let p = applied(renderer, out, state.add_participant(&event, input))?;
            writeln!(out, "Added participant {} ({}).", p.name, p.id)?;
        }
        ParticipantCommand::Edit {
            event,
            participant,
            name,
            contact,
            clear_contact,
            owed,
            paid,
            due,
            clear_due,
        } => {
            let patch = ParticipantPatch {
                name,
                contact: text_patch(contact, clear_contact),
                amount_owed: owed,
                amount_paid: paid,
                payment_due_date: date_patch(due.as_deref(), clear_due, clock.today)?,
            };
            let p = applied(renderer, out, state.update_participant(&event, &participant, patch))?;
            writeln!(out, "Updated participant {}.", p.name)?;
        }
        ParticipantCommand::Paid { event, participant } => {
            let p = applied(renderer, out, state.set_participant_paid(&event, &participant, true))?;
            writeln!(out, "{} marked paid.", p.name)?;
        }
        ParticipantCommand::Unpaid { event, participant } => {
            let p = applied(renderer, out, state.set_participant_paid(&event, &participant, false))?;
            writeln!(out, "{} marked unpaid.", p.name)?;
        }
        ParticipantCommand::Remove { event, participant } => {
            let p = applied(renderer, out, state.remove_participant(&event, &participant))?;
            writeln!(out, "Removed participant {}.", p.name)?;
        }
    }
    Ok(())
}

#[instrument(skip_all)]
fn cmd_expense<W: Write>(
    state: &mut AppState,
    renderer: &Renderer,
    action: ExpenseCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    match action {
        ExpenseCommand::Add {
            event,
            description,
            amount,
            remarks,
        } => {
            let input = NewExpense {
                description,
                amount,
                remarks,
            };
            let e = applied(renderer, out, state.add_expense(&event, input))?;
            writeln!(out, "Added expense {} ({}).", e.description, e.id)?;
        }
        ExpenseCommand::Edit {
            event,
            expense,
            description,
            amount,
            remarks,
            clear_remarks,
        } => {
            let patch = ExpensePatch {
                description,
                amount,
                remarks: text_patch(remarks, clear_remarks),
            };
            let e = applied(renderer, out, state.update_expense(&event, &expense, patch))?;
            writeln!(out, "Updated expense {}.", e.description)?;
        }
        ExpenseCommand::Paid { event, expense } => {
            let e = applied(renderer, out, state.set_expense_paid(&event, &expense, true))?;
            writeln!(out, "{} marked paid.", e.description)?;
        }
        ExpenseCommand::Unpaid { event, expense } => {
            let e = applied(renderer, out, state.set_expense_paid(&event, &expense, false))?;
            writeln!(out, "{} marked unpaid.", e.description)?;
        }
        ExpenseCommand::Remove { event, expense } => {
            let e = applied(renderer, out, state.remove_expense(&event, &expense))?;
            writeln!(out, "Removed expense {}.", e.description)?;
        }
    }
    Ok(())
}

#[instrument(skip_all, fields(view = %cursor.view(), reference = %cursor.reference()))]
fn cmd_calendar<W: Write>(
    state: &AppState,
    cfg: &Config,
    renderer: &Renderer,
    clock: &Clock,
    cursor: CalendarCursor,
    out: &mut W,
) -> anyhow::Result<()> {
    match routes::resolve(&Route::Calendar.path(), state) {
        Screen::Calendar => {}
        other => return render_screen(state, cfg, renderer, clock, other, out),
    }

    let layout_cfg = cfg.layout();
    let bars = layout(&calendar_events(state.events()), &cursor, &layout_cfg);
    renderer.write_calendar(out, &cursor, &bars, clock.today, layout_cfg.stack_slots())
}

#[instrument(skip_all, fields(path = %path))]
fn cmd_open<W: Write>(
    state: &AppState,
    cfg: &Config,
    renderer: &Renderer,
    clock: &Clock,
    path: &str,
    out: &mut W,
) -> anyhow::Result<()> {
    let screen = routes::resolve(path, state);
    render_screen(state, cfg, renderer, clock, screen, out)
}

fn render_screen<W: Write>(
    state: &AppState,
    cfg: &Config,
    renderer: &Renderer,
    clock: &Clock,
    screen: Screen<'_>,
    out: &mut W,
) -> anyhow::Result<()> {
    match screen {
        Screen::Home => cmd_list(state, cfg, renderer, out),
        Screen::EventDetail(event) => renderer.write_event_detail(out, event),
        Screen::Calendar => {
            let cursor = CalendarCursor::new(clock.today, cfg.calendar_view());
            cmd_calendar(state, cfg, renderer, clock, cursor, out)
        }
        Screen::Plans => renderer.write_plans(out, state.subscription()),
        Screen::HowTo => renderer.write_how_to(out),
        Screen::Redirect { to, reason } => {
            renderer.write_notice(out, &format!("Redirected to {to}: {reason}."))?;
            let next = routes::resolve(&to.path(), state);
            if matches!(next, Screen::Redirect { .. }) {
                return Err(anyhow!("redirect loop at {to}"));
            }
            render_screen(state, cfg, renderer, clock, next, out)
        }
        Screen::NotFound { path, back } => renderer.write_not_found(out, &path, &back),
    }
}

#[instrument(skip_all, fields(action = ?action))]
fn cmd_plan<W: Write>(
    state: &mut AppState,
    cfg: &Config,
    renderer: &Renderer,
    clock: &Clock,
    action: PlanCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    if action == PlanCommand::Show {
        return renderer.write_plans(out, state.subscription());
    }

    let settings = cfg.purchase_settings();
    let current = state.subscription().clone();
    let service = LocalPurchaseService::new(clock.now, &settings)
        .with_grant(current.is_premium().then_some(current.expiry_date).flatten());
    let mut manager = SubscriptionManager::new(service, settings);

    let result = block_on(async {
        match action {
            PlanCommand::Upgrade => manager.upgrade().await,
            PlanCommand::Downgrade => manager.downgrade().await,
            PlanCommand::Restore => manager.restore().await,
            PlanCommand::Show => manager.refresh().await,
        }
    })?;

    let next = match result {
        Ok(next) => next,
        Err(PurchaseError::Cancelled) => {
            renderer.write_notice(out, "Purchase cancelled; your plan is unchanged.")?;
            return Ok(());
        }
        Err(err) => {
            warn!(error = %err, "subscription change failed");
            renderer.write_notice(out, &format!("Subscription change failed: {err}"))?;
            return Err(anyhow!("plan {} failed", format!("{action:?}").to_lowercase()));
        }
    };

    if action == PlanCommand::Restore && !next.is_premium() {
        renderer.write_notice(out, "No purchases to restore.")?;
        return Ok(());
    }

    applied(renderer, out, state.set_subscription(next))?;
    info!(plan = %state.subscription().plan, "plan updated");
    renderer.write_plans(out, state.subscription())
}
