//! Scenario bodies.

use crate::core::errors::{MmaError, Result};
use crate::migration::attempt::{MigrationAttempt, MigrationPhase};
use crate::migration::permissions::UserIdentity;
use crate::migration::protocol::version_at_least;

use super::{Harness, RunState, Scenario, StepResult};

pub(super) fn run(harness: &Harness, scenario: Scenario, state: &mut RunState) -> Result<StepResult> {
    match scenario {
        Scenario::ResourcesMigration => resources_migration(harness, state),
        Scenario::LogContinuity => log_continuity(harness),
        Scenario::InsufficientPermission => insufficient_permission(harness),
        Scenario::SuperuserPermission => superuser_permission(harness),
        Scenario::SuperuserMigratesOtherUser => superuser_migrates_other_user(harness),
        Scenario::RollbackOnFailure => rollback_on_failure(harness),
        Scenario::ApiLoginRedirect => api_login_redirect(harness),
        Scenario::MigratedModelRecheck => migrated_model_recheck(harness, state),
    }
}

fn resources_migration(h: &Harness, state: &mut RunState) -> Result<StepResult> {
    let payload = h.fixtures.new_payload();
    let (model, application) =
        h.fixtures
            .deploy_simple_server(&h.source, "example-model-resource", Some(&payload))?;
    let migrated = h.driver.migrate(model, &h.destination, false)?;
    h.oracle
        .assert_migrated_successfully(&migrated, &application, Some(&payload))?;
    h.oracle
        .assert_registry_lists_model(&migrated, h.destination.name())?;
    state.migrated = Some((migrated, application, payload));
    Ok(StepResult::Done)
}

fn log_continuity(h: &Harness) -> Result<StepResult> {
    let model = h.fixtures.deploy_dummy_source(&h.source, "log-migration")?;
    let before = h.client().debug_log(&model, false)?;
    let migrated = h.driver.migrate(model, &h.destination, false)?;
    h.oracle
        .assert_logs_appear(&migrated, &before, h.driver.timeouts().log_replication())?;
    Ok(StepResult::Done)
}

fn insufficient_permission(h: &Harness) -> Result<StepResult> {
    let identity = UserIdentity::new("failuser", "addmodel");
    let (user_source, user_destination) =
        h.permissions
            .provision_user(&h.source, &h.destination, &identity)?;
    let model = h.fixtures.deploy_dummy_source(&user_source, "user-fail")?;
    h.permissions
        .expect_migration_rejected(&h.driver, &model, &user_destination)?;
    // Ownership must not have moved.
    h.driver.wait_for_model(&model)?;
    Ok(StepResult::Done)
}

fn superuser_permission(h: &Harness) -> Result<StepResult> {
    let identity = UserIdentity::new("passuser", "superuser");
    let (user_source, user_destination) =
        h.permissions
            .provision_user(&h.source, &h.destination, &identity)?;
    let model = h
        .fixtures
        .deploy_dummy_source(&user_source, "super-permissions")?;
    h.driver.migrate(model, &user_destination, true)?;
    Ok(StepResult::Done)
}

fn superuser_migrates_other_user(h: &Harness) -> Result<StepResult> {
    let identity = UserIdentity::new("normaluser", "addmodel");
    let (user_source, _) = h
        .permissions
        .provision_user(&h.source, &h.destination, &identity)?;
    let owned = h
        .fixtures
        .deploy_dummy_source(&user_source, "supernormal-test")?;

    let listing = h.client().show_all_models(&h.source)?;
    h.recorder().note(format!("models on {}:\n{}", h.source, listing.trim_end()));

    let as_admin = h.source.model(owned.name()).owned_by(user_source.user_name());
    let migrated = h.driver.migrate(as_admin, &h.destination, false)?;
    h.recorder()
        .note(format!("superuser migrated {}", migrated.user_qualified_name()));
    Ok(StepResult::Done)
}

fn rollback_on_failure(h: &Harness) -> Result<StepResult> {
    let (model, application) = h.fixtures.deploy_simple_server(&h.source, "rollmeback", None)?;
    let mut attempt = MigrationAttempt::new(
        model.clone(),
        h.destination.clone(),
        h.recorder().clone(),
    );
    h.driver
        .issue(&mut attempt, false)
        .map_err(MmaError::into_authorization)?;
    h.driver.wait_for_migrating(&model)?;

    h.recorder().note("disrupting destination controller to force rollback");
    h.injector.with_apiserver_disabled(&h.destination, || {
        h.driver.wait_for_model(&model)?;
        h.driver.wait_for_started(&model)?;
        h.oracle.assert_responding(&model, &application, None)?;
        h.oracle.ensure_functional(&model, &application)
    })?;
    attempt.advance(MigrationPhase::RolledBack)?;

    h.client().remove_application(&model, &application)?;
    Ok(StepResult::Done)
}

fn api_login_redirect(h: &Harness) -> Result<StepResult> {
    let model = h.fixtures.deploy_dummy_source(&h.source, "api-redirection")?;
    let before = h.oracle.assert_controller_uuid(&model)?;
    let migrated = h.driver.migrate(model, &h.destination, false)?;
    let after = h.oracle.assert_controller_uuid(&migrated)?;
    if before == after {
        return Err(MmaError::assertion(format!(
            "{migrated} still reports controller {before} after migration"
        )));
    }
    h.oracle
        .assert_registry_lists_model(&migrated, h.destination.name())?;
    Ok(StepResult::Done)
}

fn migrated_model_recheck(h: &Harness, state: &RunState) -> Result<StepResult> {
    if !version_at_least(h.source.version(), 2, 1) {
        return Ok(StepResult::NotApplicable(format!(
            "client {} predates 2.1",
            h.source.version()
        )));
    }
    let Some((model, application, payload)) = &state.migrated else {
        return Ok(StepResult::NotApplicable(
            "resources-migration did not run".to_string(),
        ));
    };
    h.oracle
        .assert_migrated_successfully(model, application, Some(payload))?;
    Ok(StepResult::Done)
}
