use crate::repository::models::{
    AccountDetails, BlockSummary, Event, L1BatchSummary, NetworkStats, Paginated, TokenInfo,
    TransactionDetails,
};
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_output(header: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut wtr = Writer::from_writer(vec![]);
    let _ = wtr.write_record(header);
    for row in rows {
        let _ = wtr.write_record(&row);
    }
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

/// Pretty JSON in the same shape the API returns.
pub fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn format_amount(amount: U256, decimals: Option<u8>) -> String {
    format_units(amount, decimals.unwrap_or(18)).unwrap_or_else(|_| amount.to_string())
}

fn format_tx_hash(hash: &str) -> String {
    if hash.len() < 10 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

pub fn format_stats(stats: &NetworkStats, format: &OutputFormat) -> String {
    let rows = [
        ("last_sealed", stats.last_sealed),
        ("last_verified", stats.last_verified),
        ("total_transactions", stats.total_transactions),
    ];
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value"]);
            for (metric, value) in rows {
                table.add_row(vec![Cell::new(metric), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => format_json(stats),
        OutputFormat::Csv => csv_output(
            &["metric", "value"],
            rows.iter()
                .map(|(metric, value)| vec![metric.to_string(), value.to_string()])
                .collect(),
        ),
    }
}

pub fn format_blocks(page: &Paginated<BlockSummary>, format: &OutputFormat) -> String {
    let rows: Vec<Vec<String>> = page
        .list
        .iter()
        .map(|block| {
            vec![
                block.number.to_string(),
                format!("{:?}", block.hash),
                block.status.as_str().to_string(),
                (block.l1_tx_count + block.l2_tx_count).to_string(),
                block.timestamp.to_string(),
            ]
        })
        .collect();

    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                return "No blocks found.".to_string();
            }
            let mut table = new_table(vec!["Block", "Hash", "Status", "Txs", "Timestamp"]);
            for mut row in rows {
                row[1] = format_tx_hash(&row[1]);
                table.add_row(row);
            }
            format!("{table}\nTotal: {}", page.total)
        }
        OutputFormat::Json => format_json(page),
        OutputFormat::Csv => csv_output(
            &["number", "hash", "status", "tx_count", "timestamp"],
            rows,
        ),
    }
}

pub fn format_l1_batches(page: &Paginated<L1BatchSummary>, format: &OutputFormat) -> String {
    let rows: Vec<Vec<String>> = page
        .list
        .iter()
        .map(|batch| {
            vec![
                batch.number.to_string(),
                batch.status.as_str().to_string(),
                batch.l1_tx_count.to_string(),
                batch.l2_tx_count.to_string(),
                batch.timestamp.to_string(),
            ]
        })
        .collect();

    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                return "No batches found.".to_string();
            }
            let mut table = new_table(vec!["Batch", "Status", "L1 Txs", "L2 Txs", "Timestamp"]);
            for row in rows {
                table.add_row(row);
            }
            format!("{table}\nTotal: {}", page.total)
        }
        OutputFormat::Json => format_json(page),
        OutputFormat::Csv => csv_output(
            &["number", "status", "l1_tx_count", "l2_tx_count", "timestamp"],
            rows,
        ),
    }
}

pub fn format_transactions(page: &Paginated<TransactionDetails>, format: &OutputFormat) -> String {
    let rows: Vec<Vec<String>> = page
        .list
        .iter()
        .map(|tx| {
            let (to, amount) = match &tx.transfer {
                Some(transfer) => (
                    format!("{:?}", transfer.to),
                    format!(
                        "{} {}",
                        format_amount(transfer.amount, transfer.token_info.decimals),
                        transfer.token_info.symbol.as_deref().unwrap_or("?")
                    ),
                ),
                None => (
                    tx.data
                        .contract_address
                        .map_or_else(|| "-".to_string(), |to| format!("{to:?}")),
                    String::new(),
                ),
            };
            vec![
                tx.block_number.to_string(),
                tx.index_in_block.to_string(),
                format!("{:?}", tx.transaction_hash),
                format!("{:?}", tx.initiator_address),
                to,
                amount,
                tx.fee.to_string(),
            ]
        })
        .collect();

    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                return "No transactions found.".to_string();
            }
            let mut table = new_table(vec![
                "Block", "Index", "Tx Hash", "From", "To", "Transfer", "Fee (Wei)",
            ]);
            for mut row in rows {
                row[2] = format_tx_hash(&row[2]);
                table.add_row(row);
            }
            format!("{table}\nTotal: {}", page.total)
        }
        OutputFormat::Json => format_json(page),
        OutputFormat::Csv => csv_output(
            &[
                "block_number",
                "index_in_block",
                "transaction_hash",
                "from",
                "to",
                "transfer",
                "fee_wei",
            ],
            rows,
        ),
    }
}

pub fn format_events(page: &Paginated<Event>, format: &OutputFormat) -> String {
    let rows: Vec<Vec<String>> = page
        .list
        .iter()
        .map(|event| {
            vec![
                event.block_number.to_string(),
                event.log_index.to_string(),
                format!("{:?}", event.address),
                event
                    .topics
                    .first()
                    .map_or_else(String::new, |topic| format!("{topic:?}")),
                format!("{:?}", event.transaction_hash),
            ]
        })
        .collect();

    match format {
        OutputFormat::Table => {
            if rows.is_empty() {
                return "No events found.".to_string();
            }
            let mut table = new_table(vec!["Block", "Log", "Address", "Topic 0", "Tx Hash"]);
            for mut row in rows {
                row[3] = format_tx_hash(&row[3]);
                row[4] = format_tx_hash(&row[4]);
                table.add_row(row);
            }
            format!("{table}\nTotal: {}", page.total)
        }
        OutputFormat::Json => format_json(page),
        OutputFormat::Csv => csv_output(
            &["block_number", "log_index", "address", "topic0", "transaction_hash"],
            rows,
        ),
    }
}

fn balance_label(token_info: &TokenInfo) -> String {
    token_info
        .symbol
        .clone()
        .unwrap_or_else(|| format!("{:?}", token_info.address))
}

pub fn format_account(account: &AccountDetails, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Token", "Balance (Formatted)", "Balance (Wei)"]);
            for balance in account.balances.values() {
                table.add_row(vec![
                    Cell::new(balance_label(&balance.token_info)),
                    Cell::new(format_amount(balance.balance, balance.token_info.decimals)),
                    Cell::new(balance.balance.to_string()),
                ]);
            }
            format!(
                "{:?} ({:?})\nSealed nonce: {}  Verified nonce: {}\n{table}",
                account.address, account.account_type, account.sealed_nonce, account.verified_nonce
            )
        }
        OutputFormat::Json => format_json(account),
        OutputFormat::Csv => csv_output(
            &["token", "balance", "balance_wei"],
            account
                .balances
                .values()
                .map(|balance| {
                    vec![
                        format!("{:?}", balance.token_info.address),
                        format_amount(balance.balance, balance.token_info.decimals),
                        balance.balance.to_string(),
                    ]
                })
                .collect(),
        ),
    }
}

pub fn format_not_found(what: &str, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Json => json!(null).to_string(),
        _ => format!("{what} not found."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::models::BlockStatus;
    use alloy_primitives::B256;

    fn page() -> Paginated<BlockSummary> {
        Paginated {
            total: 7,
            list: vec![BlockSummary {
                number: 3,
                l1_tx_count: 1,
                l2_tx_count: 2,
                hash: B256::repeat_byte(0xab),
                status: BlockStatus::Verified,
                timestamp: 1_700_000_000,
            }],
        }
    }

    #[test]
    fn blocks_render_in_every_format() {
        let csv = format_blocks(&page(), &OutputFormat::Csv);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("number,hash,status,tx_count,timestamp"));
        assert!(lines.next().unwrap().starts_with("3,0xabab"));

        let json: serde_json::Value =
            serde_json::from_str(&format_blocks(&page(), &OutputFormat::Json)).unwrap();
        assert_eq!(json["total"], 7);
        assert_eq!(json["list"][0]["status"], "verified");

        let table = format_blocks(&page(), &OutputFormat::Table);
        assert!(table.contains("verified"));
        assert!(table.ends_with("Total: 7"));
    }

    #[test]
    fn amounts_use_token_decimals() {
        assert_eq!(format_amount(U256::from(1_500_000u64), Some(6)), "1.500000");
        assert_eq!(OutputFormat::from("CSV"), OutputFormat::Csv);
        assert_eq!(format_tx_hash(""), "");
    }
}
