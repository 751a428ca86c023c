use alloy_primitives::Address;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rollup_explorer::config::Config;
use rollup_explorer::query::commands::{
    cmd_account, cmd_block, cmd_blocks, cmd_contract, cmd_events, cmd_l1_batch, cmd_l1_batches,
    cmd_stats, cmd_token, cmd_transaction, cmd_transactions,
};
use rollup_explorer::query::formatters::OutputFormat;
use rollup_explorer::query::{
    BlockListParams, Direction, EventListParams, L1BatchListParams, QueryEngine,
    TransactionListParams,
};
use rollup_explorer::repository::Database;
use rollup_explorer::tracker::ChainHead;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query the indexed rollup data", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PageArgs {
    /// Page towards newer items, starting after the cursor
    #[arg(long, default_value = "false")]
    newer: bool,

    #[arg(long, default_value = "10")]
    limit: u64,

    #[arg(long, default_value = "0")]
    offset: u64,
}

impl PageArgs {
    fn direction(&self) -> Direction {
        if self.newer {
            Direction::Newer
        } else {
            Direction::Older
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    Stats,
    Blocks {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        from: Option<u64>,
        #[arg(long)]
        batch: Option<u64>,
    },
    Block {
        number: u64,
    },
    Batches {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        from: Option<u64>,
    },
    Batch {
        number: u64,
    },
    Transactions {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        from_block: Option<u64>,
        #[arg(long)]
        from_index: Option<u64>,
        #[arg(long)]
        account: Option<Address>,
        #[arg(long)]
        contract: Option<Address>,
        #[arg(long)]
        block: Option<u64>,
        #[arg(long)]
        batch: Option<u64>,
    },
    Transaction {
        hash: String,
    },
    Account {
        address: String,
    },
    Contract {
        address: String,
    },
    Token {
        address: String,
    },
    Events {
        #[command(flatten)]
        page: PageArgs,
        #[arg(long)]
        from_block: Option<u64>,
        #[arg(long)]
        from_log_index: Option<u64>,
        #[arg(long)]
        contract: Option<Address>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    let conn = Database::open_reader(&config.database_url)?;
    let head = ChainHead::load(&conn)?;
    let engine = QueryEngine::new(&conn, head, config.limits);

    match cli.command {
        Commands::Stats => cmd_stats(&engine, &format)?,
        Commands::Blocks { page, from, batch } => {
            let params = BlockListParams {
                direction: Some(page.direction()),
                limit: page.limit,
                offset: page.offset,
                from,
                l1_batch_number: batch,
            };
            cmd_blocks(&engine, params, &format)?;
        }
        Commands::Block { number } => cmd_block(&engine, number, &format)?,
        Commands::Batches { page, from } => {
            let params = L1BatchListParams {
                direction: Some(page.direction()),
                limit: page.limit,
                offset: page.offset,
                from,
            };
            cmd_l1_batches(&engine, params, &format)?;
        }
        Commands::Batch { number } => cmd_l1_batch(&engine, number, &format)?,
        Commands::Transactions {
            page,
            from_block,
            from_index,
            account,
            contract,
            block,
            batch,
        } => {
            let params = TransactionListParams {
                direction: Some(page.direction()),
                limit: page.limit,
                offset: page.offset,
                from_block_number: from_block,
                from_tx_index: from_index,
                account_address: account,
                contract_address: contract,
                block_number: block,
                l1_batch_number: batch,
            };
            cmd_transactions(&engine, params, &format)?;
        }
        Commands::Transaction { hash } => cmd_transaction(&engine, &hash, &format)?,
        Commands::Account { address } => cmd_account(&engine, &address, &format)?,
        Commands::Contract { address } => cmd_contract(&engine, &address, &format)?,
        Commands::Token { address } => cmd_token(&engine, &address, &format)?,
        Commands::Events {
            page,
            from_block,
            from_log_index,
            contract,
        } => {
            let params = EventListParams {
                direction: Some(page.direction()),
                limit: page.limit,
                offset: page.offset,
                from_block_number: from_block,
                from_log_index,
                contract_address: contract,
            };
            cmd_events(&engine, params, &format)?;
        }
    }

    Ok(())
}
