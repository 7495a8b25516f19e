//! Visible-projection inserts: population, ledger, news, signals, alerts
//! and cases.

use super::json;
use crate::{engine::GenerationOutput, error::SimResult};
use rusqlite::{params, Connection};

pub(super) fn write(conn: &Connection, output: &GenerationOutput) -> SimResult<()> {
    let run_id = output.run_id.as_str();
    customers(conn, run_id, output)?;
    accounts(conn, run_id, output)?;
    counterparties(conn, run_id, output)?;
    transactions(conn, run_id, output)?;
    news(conn, run_id, output)?;
    signals(conn, run_id, output)?;
    alerts(conn, run_id, output)?;
    cases(conn, run_id, output)?;
    Ok(())
}

fn customers(conn: &Connection, run_id: &str, output: &GenerationOutput) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO customers
            (run_id, customer_id, name, segment, country, is_pep, is_sanctioned,
             onboarding_date, kyc_date, risk_score, risk_rating)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for c in &output.population.customers {
        stmt.execute(params![
            run_id,
            c.customer_id,
            c.name,
            c.segment,
            c.country,
            c.is_pep as i32,
            c.is_sanctioned as i32,
            c.onboarding_date.to_string(),
            c.kyc_date.to_string(),
            c.risk_score,
            c.risk_rating.as_str(),
        ])?;
    }
    Ok(())
}

fn accounts(conn: &Connection, run_id: &str, output: &GenerationOutput) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO accounts
            (run_id, account_id, customer_id, segment, currency, country,
             open_date, close_date, declared_monthly_turnover)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for a in &output.population.accounts {
        stmt.execute(params![
            run_id,
            a.account_id,
            a.customer_id,
            a.segment,
            a.currency,
            a.country,
            a.open_date.to_string(),
            a.close_date.map(|d| d.to_string()),
            a.declared_monthly_turnover,
        ])?;
    }
    Ok(())
}

fn counterparties(conn: &Connection, run_id: &str, output: &GenerationOutput) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO counterparties
            (run_id, counterparty_id, name, kind, country, bank_name, account_ref,
             is_pep, is_sanctioned)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for cp in &output.population.counterparties {
        stmt.execute(params![
            run_id,
            cp.counterparty_id,
            cp.name,
            cp.kind.as_str(),
            cp.country,
            cp.bank_name,
            cp.account_ref,
            cp.is_pep as i32,
            cp.is_sanctioned as i32,
        ])?;
    }
    Ok(())
}

fn transactions(conn: &Connection, run_id: &str, output: &GenerationOutput) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO transactions
            (run_id, txn_id, account_id, customer_id, timestamp, amount, currency,
             direction, txn_type, channel, counterparty_id, counterparty_account,
             origin_country, destination_country, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )?;
    for t in output.ledger.transactions() {
        stmt.execute(params![
            run_id,
            t.txn_id,
            t.account_id,
            t.customer_id,
            t.timestamp.to_string(),
            t.amount,
            t.currency,
            t.direction.as_str(),
            t.kind.as_str(),
            t.channel.as_str(),
            t.counterparty_id,
            t.counterparty_account,
            t.origin_country,
            t.destination_country,
            t.description,
        ])?;
    }
    Ok(())
}

fn news(conn: &Connection, run_id: &str, output: &GenerationOutput) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO news (run_id, news_id, entity_id, published, category, severity, headline)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for item in output.news.items() {
        stmt.execute(params![
            run_id,
            item.news_id,
            item.entity_id,
            item.published.to_string(),
            item.category,
            item.severity.as_str(),
            item.headline,
        ])?;
    }
    Ok(())
}

fn signals(conn: &Connection, run_id: &str, output: &GenerationOutput) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO signals (run_id, account_id, customer_id, as_of, signal, value, contributing)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for record in &output.signals {
        let as_of = record.as_of.to_string();
        for (name, value) in &record.values {
            let contributing = match record.contributing(*name) {
                [] => None,
                ids => Some(json(ids)?),
            };
            stmt.execute(params![
                run_id,
                record.account_id,
                record.customer_id,
                as_of,
                name.as_str(),
                json(value)?,
                contributing,
            ])?;
        }
    }
    Ok(())
}

fn alerts(conn: &Connection, run_id: &str, output: &GenerationOutput) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO alerts
            (run_id, alert_id, rule_id, rule_name, alert_type, account_id, customer_id,
             created_on, risk_level, rule_tier, score, risk_factors, triggering_signals,
             transaction_ids, description, case_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    )?;
    for a in &output.alerts {
        stmt.execute(params![
            run_id,
            a.alert_id,
            a.rule_id,
            a.rule_name,
            a.alert_type,
            a.account_id,
            a.customer_id,
            a.created_on.to_string(),
            a.risk_tier.as_str(),
            a.rule_tier.as_str(),
            a.score,
            json(&a.risk_factors)?,
            json(&a.triggering_signals)?,
            json(&a.transaction_ids)?,
            a.description,
            a.case_id,
        ])?;
    }
    Ok(())
}

fn cases(conn: &Connection, run_id: &str, output: &GenerationOutput) -> SimResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO cases
            (run_id, case_id, customer_id, alert_ids, priority, opened_at, closed_at,
             status, disposition, sar_filed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for c in &output.cases {
        stmt.execute(params![
            run_id,
            c.case_id,
            c.customer_id,
            json(&c.alert_ids)?,
            c.priority.as_str(),
            c.opened_at.to_string(),
            c.closed_at.map(|t| t.to_string()),
            c.status.as_str(),
            c.disposition.map(|d| d.as_str()),
            c.sar_filed as i32,
        ])?;
    }
    Ok(())
}
