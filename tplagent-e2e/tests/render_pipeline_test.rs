//! End-to-end render pipeline scenarios: inline render, backup on change and
//! identical-contents suppression.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tplagent_agent::process::RenderProcess;
use tplagent_agent::supervisor::{CancelCause, Generation};
use tplagent_e2e::harness::{agent_spec, wait_for_content, TemplateSpecBuilder};

fn one_template(
    name: &str,
    spec: tplagent_agent::config::TemplateSpec,
) -> BTreeMap<String, tplagent_agent::config::TemplateSpec> {
    let mut templates = BTreeMap::new();
    templates.insert(name.to_string(), spec);
    templates
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_basic_inline_render() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("t.out");

    let spec = TemplateSpecBuilder::raw("Name:{{ n }}", &dest)
        .static_data(serde_json::json!({"n": "Foo"}))
        .refresh_interval(Duration::from_secs(1))
        .build();

    let process = RenderProcess::new(&agent_spec(10));
    let root = CancellationToken::new();
    let generation = Generation::child_of(&root);
    let task = tokio::spawn(
        process
            .clone()
            .start(generation.clone(), one_template("basic", spec)),
    );

    wait_for_content(&dest, "Name:Foo", Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "Name:Foo");
    assert!(!dir.path().join("t.out.bak").exists());
    assert!(!dir.path().join("t.out.temp").exists());

    generation.cancel(CancelCause::Shutdown);
    task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backup_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("t.out");
    std::fs::write(&dest, "Name:Bar").unwrap();

    let spec = TemplateSpecBuilder::raw("Name:{{ n }}", &dest)
        .static_data(serde_json::json!({"n": "Foo"}))
        .render_once()
        .build();

    let process = RenderProcess::new(&agent_spec(10));
    let generation = Generation::child_of(&CancellationToken::new());
    process
        .start(generation, one_template("backup", spec))
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "Name:Foo");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("t.out.bak")).unwrap(),
        "Name:Bar"
    );
    assert!(!dir.path().join("t.out.temp").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_identical_contents_skip_failing_exec() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("t.out");
    std::fs::write(&dest, "Name:Foo").unwrap();

    // if the command ever ran, the breaker (limit 1) would trip the worker
    // fatally within a tick
    let spec = TemplateSpecBuilder::raw("Name:{{ n }}", &dest)
        .static_data(serde_json::json!({"n": "Foo"}))
        .refresh_interval(Duration::from_secs(1))
        .exec("false", &[])
        .build();

    let process = RenderProcess::new(&agent_spec(1));
    let root = CancellationToken::new();
    let generation = Generation::child_of(&root);
    let task = tokio::spawn(
        process
            .clone()
            .start(generation.clone(), one_template("steady", spec)),
    );

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(!task.is_finished(), "exec ran despite identical contents");
    assert!(!dir.path().join("t.out.bak").exists());

    generation.cancel(CancelCause::Shutdown);
    task.await.unwrap().unwrap();
}
