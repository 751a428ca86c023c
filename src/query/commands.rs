use crate::query::QueryEngine;
use crate::query::filters::{
    BlockListParams, BlockQuery, EventListParams, EventQuery, L1BatchListParams, L1BatchQuery,
    TransactionListParams, TransactionQuery,
};
use crate::query::formatters::{
    OutputFormat, format_account, format_blocks, format_events, format_json, format_l1_batches,
    format_not_found, format_stats, format_transactions,
};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use std::str::FromStr;

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address).map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))
}

fn print_found<T: serde::Serialize>(what: &str, item: Option<T>, format: &OutputFormat) {
    match item {
        Some(item) => println!("{}", format_json(&item)),
        None => println!("{}", format_not_found(what, format)),
    }
}

pub fn cmd_stats(engine: &QueryEngine, format: &OutputFormat) -> Result<()> {
    println!("{}", format_stats(&engine.network_stats(), format));
    Ok(())
}

pub fn cmd_blocks(engine: &QueryEngine, params: BlockListParams, format: &OutputFormat) -> Result<()> {
    let page = engine.blocks(&BlockQuery::try_from(params)?)?;
    println!("{}", format_blocks(&page, format));
    Ok(())
}

pub fn cmd_block(engine: &QueryEngine, number: u64, format: &OutputFormat) -> Result<()> {
    print_found("Block", engine.block(number)?, format);
    Ok(())
}

pub fn cmd_l1_batches(
    engine: &QueryEngine,
    params: L1BatchListParams,
    format: &OutputFormat,
) -> Result<()> {
    let page = engine.l1_batches(&L1BatchQuery::try_from(params)?)?;
    println!("{}", format_l1_batches(&page, format));
    Ok(())
}

pub fn cmd_l1_batch(engine: &QueryEngine, number: u64, format: &OutputFormat) -> Result<()> {
    print_found("Batch", engine.l1_batch(number)?, format);
    Ok(())
}

pub fn cmd_transactions(
    engine: &QueryEngine,
    params: TransactionListParams,
    format: &OutputFormat,
) -> Result<()> {
    let page = engine.transactions(&TransactionQuery::try_from(params)?)?;
    println!("{}", format_transactions(&page, format));
    Ok(())
}

pub fn cmd_transaction(engine: &QueryEngine, hash: &str, format: &OutputFormat) -> Result<()> {
    let hash = B256::from_str(hash)
        .map_err(|_| anyhow::anyhow!("Invalid transaction hash format: {}", hash))?;
    print_found("Transaction", engine.transaction(&hash)?, format);
    Ok(())
}

pub fn cmd_account(engine: &QueryEngine, address: &str, format: &OutputFormat) -> Result<()> {
    let address = parse_address(address)?;
    match engine.account(&address)? {
        Some(account) => println!("{}", format_account(&account, format)),
        None => println!("{}", format_not_found("Account", format)),
    }
    Ok(())
}

pub fn cmd_contract(engine: &QueryEngine, address: &str, format: &OutputFormat) -> Result<()> {
    let address = parse_address(address)?;
    print_found("Contract", engine.contract(&address)?, format);
    Ok(())
}

pub fn cmd_token(engine: &QueryEngine, address: &str, format: &OutputFormat) -> Result<()> {
    let address = parse_address(address)?;
    print_found("Token", engine.token(&address)?, format);
    Ok(())
}

pub fn cmd_events(engine: &QueryEngine, params: EventListParams, format: &OutputFormat) -> Result<()> {
    let page = engine.events(&EventQuery::try_from(params)?)?;
    println!("{}", format_events(&page, format));
    Ok(())
}
