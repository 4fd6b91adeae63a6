use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use recall_core::model::{
    AnalysisResult, CapturedResponse, MinimumContentPolicy, Provenance, ResponseSlot,
    SessionConfig, SessionConfigDraft, SessionKey, StepId,
};
use recall_core::policy::Choice;
use recall_core::time::{fixed_clock, fixed_now};
use services::{
    AnalysisError, AnalysisRequest, AnalysisService, AppServices, Command, ControllerEvent,
    RunnerOutput, SessionRunner,
};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

struct AlwaysRelevant;

#[async_trait]
impl AnalysisService for AlwaysRelevant {
    async fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        Ok(AnalysisResult {
            score: 90,
            provenance: Provenance::AiGenerated,
            ..AnalysisResult::fallback()
        })
    }
}

fn config(unit_count: usize, present_secs: u32, dwell_secs: u32) -> SessionConfig {
    let mut draft = SessionConfigDraft::segment_recall();
    draft.unit_count = unit_count;
    draft.present_secs = present_secs;
    draft.extension_secs = 4;
    draft.report_dwell_secs = dwell_secs;
    draft.break_checkpoint = None;
    draft.response_policy = MinimumContentPolicy::Any;
    draft.validate().unwrap()
}

async fn wait_for(
    output: &mut mpsc::Receiver<RunnerOutput>,
    wanted: impl Fn(&ControllerEvent) -> bool,
) -> ControllerEvent {
    loop {
        match output.recv().await {
            Some(RunnerOutput::Event(event)) if wanted(&event) => return event,
            Some(_) => {}
            None => panic!("runner stopped before the expected event"),
        }
    }
}

fn answer() -> Command {
    Command::Submit {
        slot: ResponseSlot::Single,
        response: CapturedResponse::text("enzymes lower activation energy", fixed_now()),
    }
}

#[tokio::test(start_paused = true)]
async fn runner_drives_timers_and_commands_until_closed() {
    let services = AppServices::in_memory(fixed_clock(), Arc::new(AlwaysRelevant));
    let controller = services
        .session_loop()
        .open(SessionKey::part(1, 1, 1), &config(2, 3, 2))
        .await
        .unwrap();
    let (runner, commands, mut output) = SessionRunner::channel(controller, 64);
    let handle = tokio::spawn(runner.run());

    wait_for(&mut output, |e| {
        matches!(e, ControllerEvent::StepStarted { step: StepId::Present, .. })
    })
    .await;
    let offered_after = Instant::now();
    wait_for(&mut output, |e| matches!(e, ControllerEvent::ExtensionOffered { .. })).await;
    assert_eq!(offered_after.elapsed().as_secs(), 3);

    commands.send(Command::Extension(Choice::Decline)).await.unwrap();
    wait_for(&mut output, |e| {
        matches!(e, ControllerEvent::StepStarted { step: StepId::Respond, .. })
    })
    .await;

    commands.send(Command::Done).await.unwrap();
    wait_for(&mut output, |e| matches!(e, ControllerEvent::Blocked(_))).await;

    commands.send(answer()).await.unwrap();
    commands.send(Command::Done).await.unwrap();
    let report = wait_for(&mut output, |e| matches!(e, ControllerEvent::ReportReady { .. })).await;
    assert_eq!(
        report,
        ControllerEvent::ReportReady {
            unit: 0,
            score: 90,
            provenance: Provenance::AiGenerated,
            dwell_secs: 2,
        }
    );

    // The dwell elapses on its own.
    wait_for(&mut output, |e| {
        matches!(e, ControllerEvent::StepStarted { step: StepId::Done, .. })
    })
    .await;
    commands.send(Command::Done).await.unwrap();
    wait_for(&mut output, |e| {
        matches!(e, ControllerEvent::StepStarted { unit: 1, step: StepId::Present, .. })
    })
    .await;

    drop(commands);
    let controller = handle.await.unwrap();
    assert_eq!(controller.session().active_unit_index(), 1);
    assert!(!controller.is_completed());
}

#[tokio::test(start_paused = true)]
async fn runner_stops_on_its_own_when_the_session_completes() {
    let services = AppServices::in_memory(fixed_clock(), Arc::new(AlwaysRelevant));
    let key = SessionKey::part(1, 1, 2);
    let controller = services
        .session_loop()
        .open(key, &config(1, 1, 1))
        .await
        .unwrap();
    let (runner, commands, mut output) = SessionRunner::channel(controller, 64);
    let handle = tokio::spawn(runner.run());

    wait_for(&mut output, |e| matches!(e, ControllerEvent::ExtensionOffered { .. })).await;
    commands.send(Command::Extension(Choice::Accept)).await.unwrap();
    let extended = wait_for(&mut output, |e| matches!(e, ControllerEvent::Extended { .. })).await;
    assert_eq!(extended, ControllerEvent::Extended { remaining_secs: 4 });

    wait_for(&mut output, |e| {
        matches!(e, ControllerEvent::StepStarted { step: StepId::Respond, .. })
    })
    .await;
    commands.send(Command::Retake).await.unwrap();
    match output.recv().await {
        Some(RunnerOutput::Event(ControllerEvent::StepStarted {
            step: StepId::Respond,
            ..
        })) => {}
        other => panic!("expected the capture step to restart, got {other:?}"),
    }

    commands.send(Command::SkipBreak).await.unwrap();
    assert!(matches!(output.recv().await, Some(RunnerOutput::Rejected(_))));

    commands.send(answer()).await.unwrap();
    commands.send(Command::Done).await.unwrap();
    wait_for(&mut output, |e| {
        matches!(e, ControllerEvent::StepStarted { step: StepId::Done, .. })
    })
    .await;
    commands.send(Command::Done).await.unwrap();
    let completed =
        wait_for(&mut output, |e| matches!(e, ControllerEvent::SessionCompleted { .. })).await;

    let controller = handle.await.unwrap();
    assert!(controller.is_completed());
    let ControllerEvent::SessionCompleted { summary } = completed else {
        unreachable!()
    };
    assert_eq!(summary.average_score(), 90);
    assert_eq!(
        services.session_loop().summary(key).await.unwrap(),
        Some(summary)
    );
}

#[tokio::test(start_paused = true)]
async fn report_started_between_ticks_still_gets_its_full_dwell() {
    let services = AppServices::in_memory(fixed_clock(), Arc::new(AlwaysRelevant));
    let controller = services
        .session_loop()
        .open(SessionKey::part(1, 1, 3), &config(1, 3, 4))
        .await
        .unwrap();
    let (runner, commands, mut output) = SessionRunner::channel(controller, 64);
    let handle = tokio::spawn(runner.run());

    wait_for(&mut output, |e| {
        matches!(e, ControllerEvent::StepStarted { step: StepId::Present, .. })
    })
    .await;
    time::sleep(Duration::from_millis(900)).await;
    commands.send(Command::Done).await.unwrap();
    commands.send(answer()).await.unwrap();
    commands.send(Command::Done).await.unwrap();

    wait_for(&mut output, |e| matches!(e, ControllerEvent::ReportReady { .. })).await;
    let shown_at = Instant::now();
    wait_for(&mut output, |e| {
        matches!(e, ControllerEvent::StepStarted { step: StepId::Done, .. })
    })
    .await;
    assert_eq!(shown_at.elapsed(), Duration::from_secs(4));

    drop(commands);
    handle.await.unwrap();
}
