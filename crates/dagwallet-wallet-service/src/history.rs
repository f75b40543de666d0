//! Per-address history: bills and transaction lists, filtered and paged

use crate::wallet::Wallet;
use dagwallet_core::{Address, Amount, CoinId, Error, Result};
use dagwallet_storage_sqlite::{confirmations, Payment, TxDetails};
use serde::{Deserialize, Serialize};

/// Rows per page when none is requested
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Which payments to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxFilter {
    /// Net receipts
    In,
    /// Net spends, zero-sum transactions included
    Out,
    /// Everything
    All,
}

impl TxFilter {
    /// Whether a payment with this net effect passes
    pub fn accepts(self, variation: Amount) -> bool {
        match self {
            TxFilter::In => variation > Amount::ZERO,
            TxFilter::Out => variation <= Amount::ZERO,
            TxFilter::All => true,
        }
    }
}

/// Depth of a transaction relative to the confirmation target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Not mined yet
    Mempool,
    /// Mined, below the confirmation target
    Unconfirmed,
    /// At or past the confirmation target
    Confirmed,
}

impl TxStatus {
    /// Status of a transaction at `height` seen from `current`
    pub fn at(height: i32, current: i32, min_conf: i32) -> Self {
        if height < 0 {
            TxStatus::Mempool
        } else if confirmations(height, current) < min_conf {
            TxStatus::Unconfirmed
        } else {
            TxStatus::Confirmed
        }
    }
}

/// One page of rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// 1-based page number
    pub page: usize,
    /// Rows per page
    pub page_size: usize,
    /// Rows across all pages
    pub total: usize,
    /// Rows of this page
    pub items: Vec<T>,
}

/// Cut one page out of `items`
///
/// Page 0 means the first page and page size 0 the default size. A negative
/// page returns every row. A page starting past the last row is an error.
pub fn paginate<T>(items: Vec<T>, page: i32, page_size: usize) -> Result<Page<T>> {
    let total = items.len();
    if page < 0 {
        return Ok(Page {
            page: 1,
            page_size: total,
            total,
            items,
        });
    }

    let page = page.max(1) as usize;
    let page_size = if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    };
    let start = (page - 1).saturating_mul(page_size);
    if start > total {
        return Err(Error::InvalidArgument(format!(
            "page {} starts at row {}, only {} rows",
            page, start, total
        )));
    }

    Ok(Page {
        page,
        page_size,
        total,
        items: items.into_iter().skip(start).take(page_size).collect(),
    })
}

/// A transaction as seen from one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxSummary {
    /// The recorded transaction
    pub details: TxDetails,
    /// Coin of the payment
    pub coin_id: CoinId,
    /// Net effect on the address
    pub variation: Amount,
    /// Confirmations at the synced height
    pub confirmations: i32,
    /// Depth against the configured confirmation target
    pub status: TxStatus,
}

impl Wallet {
    /// Payments of an owned address, newest first
    pub fn bill_by_address(
        &self,
        address: &Address,
        filter: TxFilter,
        page: i32,
        page_size: usize,
    ) -> Result<Page<Payment>> {
        self.manager().address(address)?;
        let bill: Vec<Payment> = self
            .ledger()
            .bill(address.hash160())?
            .into_iter()
            .filter(|p| filter.accepts(p.variation))
            .collect();
        paginate(bill, page, page_size)
    }

    /// Transactions of an owned address, newest first
    pub fn list_transactions_by_address(
        &self,
        address: &Address,
        filter: TxFilter,
        page: i32,
        page_size: usize,
    ) -> Result<Page<TxSummary>> {
        let bill = self.bill_by_address(address, filter, page, page_size)?;
        let current = self.synced_to()?.height;
        let min_conf = self.config().min_confirmations;
        let ledger = self.ledger();

        let items = bill
            .items
            .into_iter()
            .map(|payment| {
                let details = ledger.tx_details(&payment.tx_hash)?.ok_or_else(|| {
                    Error::CorruptLedger(format!("bill names unknown {}", payment.tx_hash))
                })?;
                let height = details.height();
                Ok(TxSummary {
                    details,
                    coin_id: payment.coin_id,
                    variation: payment.variation,
                    confirmations: confirmations(height, current),
                    status: TxStatus::at(height, current, min_conf),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            page: bill.page,
            page_size: bill.page_size,
            total: bill.total,
            items,
        })
    }
}
