use std::fs;
use std::path::{Path, PathBuf};

use engine::{compile_content_defs, AppPaths, ContentDatabase, ContentPlanRequest, Store};
use tempfile::TempDir;

use super::collections::CollectionsSystem;
use super::events::GameEvent;
use super::progression::ProgressionSystem;
use super::roles::{Role, RoleSwitchError};
use super::save::{SaveReason, SaveRecord, SavedRole};
use super::session::{GameSession, InteractionOutcome, SessionConfig};
use super::tasks::{StepAttemptOutcome, TaskProgress, TaskSystem};
use super::{INVENTORY_SLOT_COUNT, SAVE_RECORD_KEY, SAVE_VERSION};

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, content).expect("write");
}

fn ten_finds_xml(prefix: &str) -> String {
    let tokens = [
        "edge",
        "edge",
        "under",
        "under",
        "inOn",
        "inOn",
        "landmark",
        "landmark",
        "skillGated",
        "skillGated",
    ];
    tokens
        .iter()
        .enumerate()
        .map(|(idx, hiding)| {
            format!("<li><findId>{prefix}.find_{idx}</findId><hiding>{hiding}</hiding></li>")
        })
        .collect()
}

fn fixture_app_paths(root: &Path) -> AppPaths {
    let base = root.join("assets").join("base");
    let mods = root.join("mods");
    let cache = root.join("cache");
    fs::create_dir_all(&base).expect("base");
    fs::create_dir_all(&mods).expect("mods");
    fs::create_dir_all(&cache).expect("cache");
    AppPaths {
        root: root.to_path_buf(),
        base_content_dir: base,
        mods_dir: mods,
        cache_dir: cache,
    }
}

fn seed_fixture_content(app: &AppPaths) {
    write_file(
        &app.base_content_dir.join("items.xml"),
        r#"<Defs>
            <ItemDef><defName>item.stick</defName><label>Stick</label></ItemDef>
            <ItemDef><defName>item.axe</defName><label>Axe</label></ItemDef>
            <ItemDef><defName>item.wood</defName><label>Firewood</label></ItemDef>
            <ItemDef><defName>item.daisy</defName><label>Daisy</label></ItemDef>
            <ItemDef><defName>item.shell</defName><label>Shell</label></ItemDef>
            <ItemDef><defName>item.curio_a</defName><label>Curio A</label></ItemDef>
            <ItemDef><defName>item.curio_b</defName><label>Curio B</label></ItemDef>
            <ItemDef><defName>item.curio_c</defName><label>Curio C</label></ItemDef>
            <ItemDef><defName>item.curio_d</defName><label>Curio D</label></ItemDef>
            <ItemDef><defName>item.curio_e</defName><label>Curio E</label></ItemDef>
        </Defs>"#,
    );
    write_file(
        &app.base_content_dir.join("tasks.xml"),
        r#"<Defs>
            <TaskDef>
                <defName>forest.boy.campfire</defName>
                <label>Build the campfire</label>
                <steps>
                    <li><stepId>find_stick</stepId><target>forest.stick</target><grants>item.stick</grants></li>
                    <li><stepId>find_axe</stepId><target>forest.axe</target><grants>item.axe</grants></li>
                    <li><stepId>chop_wood</stepId><target>forest.log</target><requires>item.axe</requires><consumes>item.axe</consumes><grants>item.wood</grants></li>
                    <li><stepId>make_fire</stepId><target>forest.campfire</target><requires>item.stick,item.wood</requires><consumes>item.stick,item.wood</consumes></li>
                    <li><stepId>roast_marshmallow</stepId><target>forest.log_bench</target></li>
                </steps>
            </TaskDef>
            <TaskDef>
                <defName>forest.boy.gate</defName>
                <label>Open the old gate</label>
                <steps>
                    <li><stepId>unlock_gate</stepId><target>forest.gate</target><requires>item.axe</requires></li>
                </steps>
            </TaskDef>
            <TaskDef>
                <defName>forest.boy.collector</defName>
                <label>Curio hunt</label>
                <steps>
                    <li><stepId>c1</stepId><target>forest.c1</target><grants>item.curio_a</grants></li>
                    <li><stepId>c2</stepId><target>forest.c2</target><grants>item.curio_b</grants></li>
                    <li><stepId>c3</stepId><target>forest.c3</target><grants>item.curio_c</grants></li>
                    <li><stepId>c4</stepId><target>forest.c4</target><grants>item.curio_d</grants></li>
                    <li><stepId>c5</stepId><target>forest.c5</target><grants>item.curio_e</grants></li>
                </steps>
            </TaskDef>
            <TaskDef>
                <defName>forest.girl.flowers</defName>
                <label>Flower crown</label>
                <steps>
                    <li><stepId>pick_daisy</stepId><target>forest.flowerbed</target><grants>item.daisy</grants></li>
                    <li><stepId>braid_crown</stepId><target>forest.stump</target><requires>item.daisy</requires><consumes>item.daisy</consumes></li>
                </steps>
            </TaskDef>
            <TaskDef>
                <defName>beach.boy.castle</defName>
                <label>Sandcastle</label>
                <steps>
                    <li><stepId>build_castle</stepId><target>beach.sand</target></li>
                </steps>
            </TaskDef>
            <TaskDef>
                <defName>beach.girl.shells</defName>
                <label>Shell gift</label>
                <steps>
                    <li><stepId>collect_shell</stepId><target>beach.shellbed</target><grants>item.shell</grants></li>
                    <li><stepId>give_shell</stepId><target>beach.gull</target><requires>item.shell</requires><consumes>item.shell</consumes></li>
                </steps>
            </TaskDef>
        </Defs>"#,
    );
    write_file(
        &app.base_content_dir.join("areas.xml"),
        &format!(
            r#"<Defs>
            <AreaDef>
                <defName>area.forest</defName>
                <label>Forest</label>
                <boyTasks><li>forest.boy.campfire</li><li>forest.boy.gate</li></boyTasks>
                <girlTasks><li>forest.girl.flowers</li></girlTasks>
                <manifest>
                    <li>forest.stick</li><li>forest.axe</li><li>forest.log</li>
                    <li>forest.campfire</li><li>forest.log_bench</li><li>forest.gate</li>
                    <li>forest.flowerbed</li><li>forest.stump</li>
                </manifest>
                <finds>{forest_finds}</finds>
                <postcardTrigger>forest.bench</postcardTrigger>
                <audioZone>forest.creek</audioZone>
            </AreaDef>
            <AreaDef>
                <defName>area.beach</defName>
                <label>Beach</label>
                <boyTasks><li>beach.boy.castle</li></boyTasks>
                <girlTasks><li>beach.girl.shells</li></girlTasks>
                <manifest>
                    <li>beach.sand</li><li>beach.shellbed</li><li>beach.gull</li>
                </manifest>
                <finds>{beach_finds}</finds>
                <postcardTrigger>beach.sunset_rock</postcardTrigger>
                <audioZone>beach.waves</audioZone>
            </AreaDef>
        </Defs>"#,
            forest_finds = ten_finds_xml("forest"),
            beach_finds = ten_finds_xml("beach"),
        ),
    );
}

fn fixture_database(root: &Path) -> ContentDatabase {
    let app = fixture_app_paths(root);
    seed_fixture_content(&app);
    compile_content_defs(&app, &ContentPlanRequest::default()).expect("fixture content compiles")
}

fn open_fixture_store(root: &Path) -> Store {
    Store::open(&root.join("cache"), super::SAVE_STORE_NAMESPACE).expect("store")
}

fn fixture_session() -> (TempDir, GameSession) {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let store = open_fixture_store(temp.path());
    let session =
        GameSession::start(content, store, SessionConfig::default()).expect("session starts");
    (temp, session)
}

fn drained_subscription(session: &mut GameSession) -> engine::Subscription {
    let subscription = session.subscribe_events();
    session.poll_events(&subscription);
    subscription
}

fn complete_campfire(session: &mut GameSession) {
    for target in [
        "forest.stick",
        "forest.axe",
        "forest.log",
        "forest.campfire",
        "forest.log_bench",
    ] {
        let outcome = session.handle_interaction(target).expect("interaction");
        assert!(
            matches!(
                outcome,
                InteractionOutcome::Step(
                    StepAttemptOutcome::StepAdvanced { .. }
                        | StepAttemptOutcome::TaskCompleted { .. }
                )
            ),
            "unexpected outcome for {target}: {outcome:?}"
        );
    }
}

#[test]
fn session_boot_enters_starting_area_and_starts_first_task() {
    let (_temp, session) = fixture_session();
    let forest = session.content.area_id_by_name("area.forest").expect("forest");
    assert_eq!(session.world.loaded_area(), Some(forest));
    assert_eq!(session.progression.current_area(Role::Boy), Some(forest));
    assert!(session.progression.unlocked_areas(Role::Boy).contains(&forest));

    let campfire = session
        .content
        .task_id_by_name("forest.boy.campfire")
        .expect("campfire");
    assert_eq!(
        session.tasks.progress(Role::Boy),
        TaskProgress::InProgress {
            task: campfire,
            step_index: 0
        }
    );
    assert!(session.role_snapshot().is_consistent());
}

#[test]
fn switch_role_synchronizes_every_system_before_returning() {
    let (_temp, mut session) = fixture_session();
    let receipt = session.switch_role(Role::Girl).expect("switch");
    assert!(receipt.changed);
    assert_eq!(receipt.from, Role::Boy);

    assert_eq!(session.tasks.current_role(), Some(Role::Girl));
    assert_eq!(session.world.active_player_role(), Some(Role::Girl));
    assert_eq!(session.progression.role_id(), Some(Role::Girl));
    assert_eq!(session.autosave.reported_active_role(), Some(Role::Girl));
    assert_eq!(session.active_role(), Role::Girl);

    // The stage reflects the swap: the girl rig is the visible player mesh.
    let girl_rig = session.world.avatar_rig(Role::Girl).expect("girl rig");
    let boy_rig = session.world.avatar_rig(Role::Boy).expect("boy rig");
    assert!(session.stage.avatar(girl_rig).expect("girl avatar").visible);
    assert!(!session.stage.avatar(boy_rig).expect("boy avatar").visible);

    let snapshot = session.role_snapshot();
    assert!(snapshot.is_consistent());
    assert!(snapshot.describe_mismatches().is_empty());
}

#[test]
fn switch_to_active_role_is_a_noop() {
    let (_temp, mut session) = fixture_session();
    let subscription = drained_subscription(&mut session);
    let receipt = session.switch_role(Role::Boy).expect("noop switch");
    assert!(!receipt.changed);
    assert_eq!(session.poll_events(&subscription), Vec::<GameEvent>::new());
    assert_eq!(session.registry.completed_switches(), 0);
}

#[test]
fn switch_emits_character_switch_then_saves_tagged_with_new_role() {
    let (_temp, mut session) = fixture_session();
    let subscription = drained_subscription(&mut session);
    session.switch_role(Role::Girl).expect("switch");

    let events = session.poll_events(&subscription);
    assert!(matches!(
        events.first(),
        Some(GameEvent::CharacterSwitch { role: Role::Girl })
    ));
    assert!(events.iter().any(|event| matches!(
        event,
        GameEvent::SaveCompleted {
            role: Role::Girl,
            reason: SaveReason::RoleSwitch
        }
    )));
    assert_eq!(session.autosave.last_write_role(), Some(Role::Girl));

    let record: SaveRecord = {
        let payload = session
            .store
            .get::<serde_json::Value>(SAVE_RECORD_KEY, SAVE_VERSION)
            .expect("record present");
        super::save::decode_save_record(payload).expect("decodes")
    };
    assert_eq!(record.active_role, SavedRole::Girl);
}

#[test]
fn failed_switch_rolls_back_and_leaves_no_partial_state() {
    let (_temp, mut session) = fixture_session();
    session.world.drop_rig(Role::Girl);

    let error = session.switch_role(Role::Girl).expect_err("switch must fail");
    let super::session::SessionError::RoleSwitch(RoleSwitchError::DependentFailed {
        system,
        rolled_back,
        ..
    }) = error
    else {
        panic!("unexpected error kind");
    };
    assert_eq!(system, "World");
    assert!(rolled_back);

    assert_eq!(session.active_role(), Role::Boy);
    assert_eq!(session.tasks.current_role(), Some(Role::Boy));
    assert_eq!(session.progression.role_id(), Some(Role::Boy));
    assert_eq!(session.autosave.reported_active_role(), Some(Role::Boy));
    assert!(session.role_snapshot().is_consistent());
}

#[test]
fn five_step_chain_completes_with_one_step_event_per_call() {
    let (_temp, mut session) = fixture_session();
    let subscription = drained_subscription(&mut session);
    complete_campfire(&mut session);

    let events = session.poll_events(&subscription);
    let step_events = events
        .iter()
        .filter(|event| matches!(event, GameEvent::TaskStepCompleted { .. }))
        .count();
    let completion_events = events
        .iter()
        .filter(|event| matches!(event, GameEvent::TaskCompleted { .. }))
        .count();
    assert_eq!(step_events, 5);
    assert_eq!(completion_events, 1);

    // Task chain: completing the campfire hands the role the next authored
    // task in the area.
    let gate = session
        .content
        .task_id_by_name("forest.boy.gate")
        .expect("gate");
    assert_eq!(
        session.tasks.progress(Role::Boy),
        TaskProgress::InProgress {
            task: gate,
            step_index: 0
        }
    );
    let campfire = session
        .content
        .task_id_by_name("forest.boy.campfire")
        .expect("campfire");
    assert!(session.progression.is_task_completed(Role::Boy, campfire));
}

#[test]
fn inventory_follows_grants_and_consumes_through_the_chain() {
    let (_temp, mut session) = fixture_session();
    let stick = session.content.item_id_by_name("item.stick").expect("stick");
    let axe = session.content.item_id_by_name("item.axe").expect("axe");
    let wood = session.content.item_id_by_name("item.wood").expect("wood");

    session.handle_interaction("forest.stick").expect("step 1");
    assert!(session.tasks.inventory(Role::Boy).has(stick));

    session.handle_interaction("forest.axe").expect("step 2");
    assert!(session.tasks.inventory(Role::Boy).has(axe));

    session.handle_interaction("forest.log").expect("step 3");
    assert!(!session.tasks.inventory(Role::Boy).has(axe));
    assert!(session.tasks.inventory(Role::Boy).has(wood));

    session.handle_interaction("forest.campfire").expect("step 4");
    assert_eq!(session.tasks.inventory(Role::Boy).count(), 0);
}

#[test]
fn wrong_target_changes_nothing_and_emits_nothing() {
    let (_temp, mut session) = fixture_session();
    let subscription = drained_subscription(&mut session);
    let before = session.tasks.progress(Role::Boy);

    let outcome = session
        .handle_interaction("forest.stump")
        .expect("harmless tap");
    assert_eq!(
        outcome,
        InteractionOutcome::Step(StepAttemptOutcome::WrongTarget)
    );
    assert_eq!(session.tasks.progress(Role::Boy), before);
    assert_eq!(session.poll_events(&subscription), Vec::<GameEvent>::new());
}

#[test]
fn missing_requirements_reports_and_leaves_state_unchanged() {
    let (_temp, mut session) = fixture_session();
    complete_campfire(&mut session);

    // The gate step wants the axe, which the campfire chain consumed.
    let before_progress = session.tasks.progress(Role::Boy);
    let before_count = session.tasks.inventory(Role::Boy).count();
    let axe = session.content.item_id_by_name("item.axe").expect("axe");

    let outcome = session.handle_interaction("forest.gate").expect("attempt");
    assert_eq!(
        outcome,
        InteractionOutcome::Step(StepAttemptOutcome::MissingRequirements {
            missing: vec![axe]
        })
    );
    assert_eq!(session.tasks.progress(Role::Boy), before_progress);
    assert_eq!(session.tasks.inventory(Role::Boy).count(), before_count);
}

#[test]
fn grant_over_slot_cap_rejects_step_without_losing_consumed_items() {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let collector = content
        .task_id_by_name("forest.boy.collector")
        .expect("collector");

    let mut tasks = TaskSystem::new();
    tasks.apply_role_change(Role::Boy).expect("role");
    tasks
        .start_task(&content, Role::Boy, collector)
        .expect("start");
    for target in ["forest.c1", "forest.c2", "forest.c3", "forest.c4"] {
        let outcome = tasks
            .attempt_step(&content, Role::Boy, target)
            .expect("advance");
        assert!(matches!(outcome, StepAttemptOutcome::StepAdvanced { .. }));
    }
    assert_eq!(tasks.inventory(Role::Boy).count(), INVENTORY_SLOT_COUNT);

    let outcome = tasks
        .attempt_step(&content, Role::Boy, "forest.c5")
        .expect("fifth grant");
    assert_eq!(
        outcome,
        StepAttemptOutcome::InventoryFull { needed: 1, free: 0 }
    );
    assert_eq!(tasks.inventory(Role::Boy).count(), INVENTORY_SLOT_COUNT);
    assert_eq!(
        tasks.progress(Role::Boy),
        TaskProgress::InProgress {
            task: collector,
            step_index: 4
        }
    );
}

#[test]
fn starting_a_task_over_an_incomplete_one_is_an_error() {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let campfire = content
        .task_id_by_name("forest.boy.campfire")
        .expect("campfire");
    let gate = content.task_id_by_name("forest.boy.gate").expect("gate");

    let mut tasks = TaskSystem::new();
    tasks.apply_role_change(Role::Boy).expect("role");
    tasks.start_task(&content, Role::Boy, campfire).expect("start");
    let error = tasks
        .start_task(&content, Role::Boy, gate)
        .expect_err("second start must fail");
    assert!(matches!(
        error,
        super::tasks::TaskError::TaskAlreadyActive { .. }
    ));
}

#[test]
fn unlock_area_is_idempotent() {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let beach = content.area_id_by_name("area.beach").expect("beach");

    let mut progression = ProgressionSystem::new();
    assert!(progression.unlock_area(Role::Girl, beach));
    let once = progression.unlocked_areas(Role::Girl).clone();
    assert!(!progression.unlock_area(Role::Girl, beach));
    assert_eq!(progression.unlocked_areas(Role::Girl), &once);
}

#[test]
fn record_find_is_idempotent_and_trophy_fires_exactly_once() {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let forest = content.area_id_by_name("area.forest").expect("forest");

    let mut collections = CollectionsSystem::new();
    for idx in 0..9 {
        let change = collections
            .record_find(&content, forest, &format!("forest.find_{idx}"))
            .expect("find");
        assert!(change.is_updated());
        assert!(!collections.trophy_awarded(forest));
    }
    // Re-recording an already-found object never double-counts.
    let repeat = collections
        .record_find(&content, forest, "forest.find_0")
        .expect("repeat");
    assert!(!repeat.is_updated());
    assert_eq!(collections.find_count(forest), 9);

    let change = collections
        .record_find(&content, forest, "forest.find_9")
        .expect("tenth");
    assert_eq!(
        change,
        super::collections::CollectionsChange::Updated {
            trophy_awarded: true
        }
    );
    assert!(collections.trophy_awarded(forest));
    assert_eq!(collections.find_count(forest), 10);

    // Trophy is monotonic: repeating the last find cannot re-award it.
    let after = collections
        .record_find(&content, forest, "forest.find_9")
        .expect("repeat tenth");
    assert!(!after.is_updated());
    assert!(collections.trophy_awarded(forest));
}

#[test]
fn finds_are_shared_between_both_twins() {
    let (_temp, mut session) = fixture_session();
    let forest = session.content.area_id_by_name("area.forest").expect("forest");

    let outcome = session.handle_interaction("forest.find_3").expect("find");
    assert_eq!(
        outcome,
        InteractionOutcome::Find {
            newly_found: true,
            trophy_awarded: false
        }
    );

    session.switch_role(Role::Girl).expect("switch");
    assert!(session.collections.is_found(forest, "forest.find_3"));
    let repeat = session.handle_interaction("forest.find_3").expect("repeat");
    assert_eq!(
        repeat,
        InteractionOutcome::Find {
            newly_found: false,
            trophy_awarded: false
        }
    );
}

#[test]
fn postcard_and_audio_triggers_route_to_collections() {
    let (_temp, mut session) = fixture_session();
    let forest = session.content.area_id_by_name("area.forest").expect("forest");
    let subscription = drained_subscription(&mut session);

    let postcard = session.handle_interaction("forest.bench").expect("postcard");
    assert_eq!(
        postcard,
        InteractionOutcome::Postcard { newly_awarded: true }
    );
    let audio = session.handle_interaction("forest.creek").expect("audio");
    assert_eq!(
        audio,
        InteractionOutcome::AudioUnlock {
            newly_unlocked: true
        }
    );
    assert!(session.collections.postcard_awarded(forest));
    assert!(session.collections.audio_unlocked(forest));

    let updates = session
        .poll_events(&subscription)
        .into_iter()
        .filter(|event| matches!(event, GameEvent::CollectionsUpdate { .. }))
        .count();
    assert_eq!(updates, 2);

    // Idempotent repeats emit nothing further.
    session.handle_interaction("forest.bench").expect("repeat");
    let repeat_updates = session
        .poll_events(&subscription)
        .into_iter()
        .filter(|event| matches!(event, GameEvent::CollectionsUpdate { .. }))
        .count();
    assert_eq!(repeat_updates, 0);
}

#[test]
fn area_entry_unlocks_loads_props_and_saves() {
    let (_temp, mut session) = fixture_session();
    let subscription = drained_subscription(&mut session);
    session.enter_area("area.beach").expect("enter beach");

    let beach = session.content.area_id_by_name("area.beach").expect("beach");
    assert_eq!(session.world.loaded_area(), Some(beach));
    assert!(session.progression.unlocked_areas(Role::Boy).contains(&beach));
    assert_eq!(session.stage.prop_count(), 3);
    assert!(session.stage.find_prop("beach.gull").is_some());

    let events = session.poll_events(&subscription);
    assert!(events.iter().any(|event| matches!(
        event,
        GameEvent::AreaEntered { role: Role::Boy, area } if area == "area.beach"
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        GameEvent::SaveCompleted {
            reason: SaveReason::AreaChange,
            ..
        }
    )));
}

#[test]
fn switching_twins_returns_to_their_own_area() {
    let (_temp, mut session) = fixture_session();
    session.enter_area("area.beach").expect("boy to beach");

    session.switch_role(Role::Girl).expect("switch");
    let forest = session.content.area_id_by_name("area.forest").expect("forest");
    assert_eq!(session.world.loaded_area(), Some(forest));
    assert_eq!(session.progression.current_area(Role::Girl), Some(forest));

    let flowers = session
        .content
        .task_id_by_name("forest.girl.flowers")
        .expect("flowers");
    assert_eq!(
        session.tasks.progress(Role::Girl),
        TaskProgress::InProgress {
            task: flowers,
            step_index: 0
        }
    );

    let beach = session.content.area_id_by_name("area.beach").expect("beach");
    session.switch_role(Role::Boy).expect("switch back");
    assert_eq!(session.world.loaded_area(), Some(beach));
}

#[test]
fn autosave_fires_on_interval_and_resets() {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let store = open_fixture_store(temp.path());
    let config = SessionConfig {
        autosave_interval_seconds: 10.0,
        ..SessionConfig::default()
    };
    let mut session = GameSession::start(content, store, config).expect("session");
    let writes_after_boot = session.autosave.write_count();

    assert!(!session.tick(4.0));
    assert!(!session.tick(4.0));
    assert!(session.tick(4.0));
    assert_eq!(session.autosave.write_count(), writes_after_boot + 1);
    assert_eq!(session.autosave.last_write_role(), Some(Role::Boy));

    // Timer restarts after the write.
    assert!(!session.tick(4.0));
}

#[test]
fn save_round_trip_restores_identical_state() {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let store = open_fixture_store(temp.path());
    let mut session =
        GameSession::start(content.clone(), store, SessionConfig::default()).expect("session");

    complete_campfire(&mut session);
    session.handle_interaction("forest.find_0").expect("find");
    session.handle_interaction("forest.bench").expect("postcard");
    session.record_camp_upgrade("camp.firepit");
    session.switch_role(Role::Girl).expect("switch");
    session.handle_interaction("forest.flowerbed").expect("girl step");
    assert!(session.save_now(SaveReason::Manual));

    let saved = super::save::build_save_record(
        session.active_role(),
        &session.tasks,
        &session.progression,
        &session.collections,
        &session.content,
    )
    .expect("record");

    let store = open_fixture_store(temp.path());
    let restored =
        GameSession::start(content, store, SessionConfig::default()).expect("restored session");
    let restored_record = super::save::build_save_record(
        restored.active_role(),
        &restored.tasks,
        &restored.progression,
        &restored.collections,
        &restored.content,
    )
    .expect("restored record");

    assert_eq!(saved, restored_record);
    assert_eq!(restored.active_role(), Role::Girl);
    assert!(restored.role_snapshot().is_consistent());
}

#[test]
fn version_mismatch_discards_save_and_uses_defaults() {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let store = open_fixture_store(temp.path());
    let mut session =
        GameSession::start(content.clone(), store, SessionConfig::default()).expect("session");
    session.switch_role(Role::Girl).expect("switch");
    assert!(session.save_now(SaveReason::Manual));

    // Re-tag the stored record with a future schema version.
    let payload = session
        .store
        .get::<serde_json::Value>(SAVE_RECORD_KEY, SAVE_VERSION)
        .expect("payload");
    session
        .store
        .put(SAVE_RECORD_KEY, SAVE_VERSION + 1, &payload)
        .expect("rewrite");

    let store = open_fixture_store(temp.path());
    let fresh = GameSession::start(content, store, SessionConfig::default()).expect("fresh");
    assert_eq!(fresh.active_role(), Role::Boy);
    assert!(fresh.progression.completed_tasks(Role::Boy).is_empty());
}

#[test]
fn save_referencing_unknown_defs_falls_back_to_defaults() {
    let temp = TempDir::new().expect("tempdir");
    let content = fixture_database(temp.path());
    let store = open_fixture_store(temp.path());
    {
        let mut record = SaveRecord {
            active_role: SavedRole::Girl,
            boy: Default::default(),
            girl: Default::default(),
            collections: Default::default(),
        };
        record.boy.unlocked_areas.push("area.vanished".to_string());
        store.put(SAVE_RECORD_KEY, SAVE_VERSION, &record).expect("seed");
    }

    let session = GameSession::start(content, store, SessionConfig::default()).expect("session");
    assert_eq!(session.active_role(), Role::Boy);
    assert!(session
        .progression
        .unlocked_areas(Role::Boy)
        .iter()
        .next()
        .is_some());
}

#[test]
fn snapshot_mid_switch_names_exactly_the_stale_systems() {
    let (_temp, mut session) = fixture_session();

    // Simulate a buggy fan-out that only reached two of the four systems.
    session.tasks.apply_role_change(Role::Girl).expect("tasks");
    let stage = &mut session.stage;
    session
        .world
        .apply_role_change(Role::Girl, stage)
        .expect("world");

    let snapshot = session.role_snapshot();
    assert!(!snapshot.is_consistent());
    let mismatches = snapshot.describe_mismatches();
    assert_eq!(mismatches.len(), 2);
    assert!(mismatches[0].contains("Progression"));
    assert!(mismatches[1].contains("Autosave"));
}

#[test]
fn snapshot_reflects_inventory_count_and_current_task() {
    let (_temp, mut session) = fixture_session();
    session.handle_interaction("forest.stick").expect("step 1");

    let snapshot = session.role_snapshot();
    assert_eq!(snapshot.inventory_count, 1);
    assert_eq!(
        snapshot.current_task.as_deref(),
        Some("forest.boy.campfire")
    );
}

#[test]
fn camp_upgrades_are_shared_and_idempotent() {
    let (_temp, mut session) = fixture_session();
    assert!(session.record_camp_upgrade("camp.firepit"));
    assert!(!session.record_camp_upgrade("camp.firepit"));
    session.switch_role(Role::Girl).expect("switch");
    assert!(!session.record_camp_upgrade("camp.firepit"));
    let snapshot = session.collections.snapshot(&session.content);
    assert_eq!(snapshot.camp_upgrades, vec!["camp.firepit".to_string()]);
}

#[test]
fn shipped_base_content_compiles_and_validates() {
    let workspace_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");
    let app = AppPaths {
        root: workspace_root.clone(),
        base_content_dir: workspace_root.join("assets").join("base"),
        mods_dir: workspace_root.join("mods"),
        cache_dir: workspace_root.join("cache"),
    };
    let db = compile_content_defs(&app, &ContentPlanRequest::default())
        .expect("shipped content is valid");
    assert!(db.area_id_by_name(super::STARTING_AREA).is_some());
    for area in db.areas() {
        assert!(area.placeholder || area.finds.len() == engine::FINDS_PER_AREA);
    }
}
