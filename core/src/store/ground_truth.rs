//! Ground-truth inserts: the scenario registry and every per-record label.

use super::json;
use crate::{engine::GenerationOutput, error::SimResult, projection::account_truth};
use rusqlite::{params, Connection};

pub(super) fn write(conn: &Connection, output: &GenerationOutput) -> SimResult<()> {
    let run_id = output.run_id.as_str();

    let mut scenario = conn.prepare(
        "INSERT INTO gt_scenarios
            (run_id, scenario_id, typology, primary_account, customer_id, participants,
             start_at, end_at, total_amount)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    let mut member = conn.prepare(
        "INSERT INTO gt_scenario_transactions (run_id, scenario_id, txn_id) VALUES (?1, ?2, ?3)",
    )?;
    for s in output.registry.scenarios() {
        scenario.execute(params![
            run_id,
            s.scenario_id,
            s.typology.as_str(),
            s.primary_account,
            s.customer_id,
            json(&s.participants)?,
            s.start.to_string(),
            s.end.to_string(),
            s.total_amount,
        ])?;
        for txn_id in &s.transaction_ids {
            member.execute(params![run_id, s.scenario_id, txn_id])?;
        }
    }

    let mut label = conn.prepare(
        "INSERT INTO gt_transaction_labels (run_id, txn_id, is_suspicious, typology, scenario_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for t in output.ledger.truths() {
        label.execute(params![
            run_id,
            t.txn_id,
            t.is_suspicious as i32,
            t.typology.map(|ty| ty.as_str()),
            t.scenario_id,
        ])?;
    }

    let mut account = conn.prepare(
        "INSERT INTO gt_account_labels (run_id, account_id, is_suspicious, typologies, scenario_ids)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for a in account_truth(&output.population.accounts, &output.registry) {
        account.execute(params![
            run_id,
            a.account_id,
            a.is_suspicious as i32,
            json(&a.typologies)?,
            json(&a.scenario_ids)?,
        ])?;
    }

    let mut alert = conn.prepare(
        "INSERT INTO gt_alert_labels
            (run_id, alert_id, true_positive, scenario_id, typology, calibration_filler)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for a in &output.alert_truth {
        alert.execute(params![
            run_id,
            a.alert_id,
            a.true_positive as i32,
            a.scenario_id,
            a.typology.map(|ty| ty.as_str()),
            a.calibration_filler as i32,
        ])?;
    }

    let mut case = conn.prepare(
        "INSERT INTO gt_case_labels (run_id, case_id, contains_true_positive, scenario_ids)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for c in &output.case_truth {
        case.execute(params![
            run_id,
            c.case_id,
            c.contains_true_positive as i32,
            json(&c.scenario_ids)?,
        ])?;
    }
    Ok(())
}
