//! Integration tests for scripted replay.

use busflow_loading::config::EngineConfig;
use busflow_loading::model::ProgressDisplay;
use busflow_loading::scenario::{Frame, Script, Trigger, replay};

fn run(script: &str) -> Vec<Frame> {
    let script = Script::from_toml_str(script).expect("script should parse");
    replay(&script, EngineConfig::default()).expect("replay should succeed")
}

#[test]
fn page_load_then_quick_resume() {
    let frames = run(r#"
        end_ms = 2000

        [[step]]
        at_ms = 0
        start = { id = "page", scope = "route", key = "routes" }

        [[step]]
        at_ms = 100
        probe = true

        [[step]]
        at_ms = 160
        probe = true

        [[step]]
        at_ms = 200
        stop = "page"

        [[step]]
        at_ms = 500
        start = { id = "fetch", scope = "system" }

        [[step]]
        at_ms = 600
        stop = "fetch"
    "#);

    let summary: Vec<(u64, &Trigger, bool)> = frames
        .iter()
        .map(|f| (f.at_ms, &f.trigger, f.snapshot.should_reveal))
        .collect();

    assert_eq!(summary.len(), 7);
    assert_eq!(summary[0].0, 0);
    assert!(!summary[0].2);
    assert_eq!(summary[1], (100, &Trigger::Probe, false));
    assert_eq!(summary[2], (150, &Trigger::Timer, true));
    assert_eq!(summary[3], (160, &Trigger::Probe, true));
    assert_eq!(frames[3].snapshot.visible_since, Some(150));

    assert_eq!(
        frames[4].trigger,
        Trigger::Stop {
            id: "page".to_string(),
            applied: true
        }
    );
    assert_eq!(frames[4].snapshot.last_settled_at, Some(200));

    // Within the rapid-resume window: shown without delay.
    assert_eq!(frames[5].at_ms, 500);
    assert!(frames[5].snapshot.should_reveal);
    assert_eq!(frames[5].snapshot.visible_since, Some(500));

    assert!(!frames[6].snapshot.should_reveal);
}

#[test]
fn end_ms_runs_out_pending_timers() {
    let frames = run(r#"
        end_ms = 1500

        [[step]]
        at_ms = 0
        start = { id = "import", scope = "action", key = "import_customers", current = 3, total = 5 }
    "#);

    assert_eq!(frames.len(), 3);
    assert_eq!(frames[1].at_ms, 150);
    assert!(frames[1].snapshot.is_short_visible);
    assert_eq!(frames[2].at_ms, 1000);
    assert!(frames[2].snapshot.should_reveal);
    assert!(!frames[2].snapshot.is_short_visible);

    let display = frames[2].snapshot.display.as_ref().unwrap();
    assert_eq!(display.message, "Importing customers...");
    assert_eq!(
        display.progress,
        Some(ProgressDisplay::Determinate {
            current: 3,
            total: 5,
            percent: 60.0
        })
    );
}

#[test]
fn stopping_twice_is_reported_not_fatal() {
    let frames = run(r#"
        [[step]]
        at_ms = 0
        start = { id = "save" }

        [[step]]
        at_ms = 10
        stop = "save"

        [[step]]
        at_ms = 20
        stop = "save"

        [[step]]
        at_ms = 30
        update = { id = "save", message = "late" }
    "#);

    assert_eq!(
        frames[2].trigger,
        Trigger::Stop {
            id: "save".to_string(),
            applied: false
        }
    );
    assert_eq!(
        frames[3].trigger,
        Trigger::Update {
            id: "save".to_string(),
            applied: false
        }
    );
    assert_eq!(frames[3].snapshot.active_count, 0);
}

#[test]
fn malformed_scripts_are_rejected() {
    // time goes backwards
    assert!(
        Script::from_toml_str("[[step]]\nat_ms = 10\nprobe = true\n[[step]]\nat_ms = 5\nprobe = true")
            .is_err()
    );
    // two actions in one step
    assert!(Script::from_toml_str("[[step]]\nat_ms = 0\nprobe = true\nstop = \"a\"").is_err());
    // no action
    assert!(Script::from_toml_str("[[step]]\nat_ms = 0").is_err());
    // unknown scope
    assert!(Script::from_toml_str("[[step]]\nat_ms = 0\nstart = { id = \"a\", scope = \"depot\" }").is_err());
}

#[test]
fn replay_rejects_bad_ids_and_half_progress() {
    let unknown = Script::from_toml_str("[[step]]\nat_ms = 0\nstop = \"ghost\"").unwrap();
    assert!(replay(&unknown, EngineConfig::default()).is_err());

    let duplicate = Script::from_toml_str(
        "[[step]]\nat_ms = 0\nstart = { id = \"a\" }\n[[step]]\nat_ms = 1\nstart = { id = \"a\" }",
    )
    .unwrap();
    assert!(replay(&duplicate, EngineConfig::default()).is_err());

    let half = Script::from_toml_str("[[step]]\nat_ms = 0\nstart = { id = \"a\", current = 1 }")
        .unwrap();
    assert!(replay(&half, EngineConfig::default()).is_err());
}

#[test]
fn frames_serialize_as_json() {
    let frames = run("[[step]]\nat_ms = 0\nstart = { id = \"a\", scope = \"auth\" }");
    let json = serde_json::to_value(&frames[0]).unwrap();
    assert_eq!(json["trigger"]["kind"], "start");
    assert_eq!(json["snapshot"]["display"]["scope"], "auth");
    assert_eq!(json["snapshot"]["reveal_delay_ms"], 150);
}

#[test]
fn bundled_route_save_script() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/route_save.toml");
    let script = Script::load(&path).unwrap();
    let frames = replay(&script, EngineConfig::default()).unwrap();

    assert_eq!(frames.len(), 11);
    // quick page load never shows
    assert!(frames[..2].iter().all(|f| !f.snapshot.should_reveal));
    // save follows within the rapid-resume window
    assert!(frames[2].snapshot.should_reveal);
    // import after a quiet gap waits for the delay
    assert!(!frames[4].snapshot.should_reveal);
    assert_eq!((frames[5].at_ms, &frames[5].trigger), (2150, &Trigger::Timer));
    assert_eq!((frames[9].at_ms, &frames[9].trigger), (3000, &Trigger::Timer));
    assert!(!frames[10].snapshot.should_reveal);
}

#[test]
fn load_missing_script_names_the_path() {
    let path = std::env::temp_dir().join("busflow-loading-no-such-script.toml");
    let err = Script::load(&path).unwrap_err();
    let message = err.to_string();
    assert!(message.starts_with("scenario error: cannot read script"));
    assert!(message.contains("busflow-loading-no-such-script.toml"));
}

#[test]
fn load_invalid_script_reports_path_once_prefixed() {
    let path = std::env::temp_dir().join(format!(
        "busflow-loading-out-of-order-{}.toml",
        std::process::id()
    ));
    std::fs::write(
        &path,
        "[[step]]\nat_ms = 50\nprobe = true\n\n[[step]]\nat_ms = 10\nprobe = true\n",
    )
    .unwrap();

    let err = Script::load(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();

    let message = err.to_string();
    assert_eq!(message.matches("scenario error:").count(), 1);
    assert!(message.contains(&path.display().to_string()));
    assert!(message.contains("earlier than the previous step"));
}
