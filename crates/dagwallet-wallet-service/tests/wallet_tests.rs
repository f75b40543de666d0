//! Wallet lifecycle, ingestion, queries and sends against a real database

mod common;

use common::*;
use dagwallet_core::signer::verify_input;
use dagwallet_core::test_helpers::{block, coinbase_tx, funding_tx, pay_to, spending_tx};
use dagwallet_core::txrules::{estimate_serialize_size, fee_for_serialize_size};
use dagwallet_core::{Address, Error, OutPoint, PrivateKey, DEFAULT_RELAY_FEE_PER_KB};
use dagwallet_params::NetworkType;
use dagwallet_wallet_service::{TxFilter, TxStatus, Wallet};

const FEE: i64 = DEFAULT_RELAY_FEE_PER_KB;

#[test]
fn test_create_then_open() {
    let (dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    wallet.close();
    drop(wallet);

    let reopened = Wallet::open(fast_config(&dir), PUBLIC).unwrap();
    assert!(reopened.is_locked());
    assert_eq!(reopened.account_of_address(&address).unwrap().1, 0);
    assert_eq!(reopened.synced_to().unwrap().height, 0);
}

#[test]
fn test_create_twice_fails() {
    let (dir, _wallet) = new_wallet();
    let result = Wallet::create(
        fast_config(&dir),
        &[7u8; 32],
        PUBLIC,
        PRIVATE,
        chrono::Utc::now(),
    );
    assert!(matches!(result, Err(Error::AlreadyExists(_))));
}

#[test]
fn test_open_missing_or_wrong_passphrase() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Wallet::open(fast_config(&dir), PUBLIC),
        Err(Error::NoExist(_))
    ));

    let (dir, wallet) = new_wallet();
    drop(wallet);
    assert!(matches!(
        Wallet::open(fast_config(&dir), b"nope"),
        Err(Error::Crypto(_))
    ));
}

#[test]
fn test_block_credit_counts_at_its_own_height() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let tx = funding_tx(1, vec![pay_to(&address, 500_000_000)]);

    assert_eq!(wallet.process_block(&block(1, vec![tx])).unwrap(), 1);
    assert_eq!(wallet.synced_to().unwrap().height, 1);

    // one confirmation at the block's own height
    let balance = meer(&wallet.balance(&address, 1).unwrap());
    assert_eq!(balance.unspent, atoms(500_000_000));
    assert_eq!(balance.unconfirmed, atoms(0));

    let balance = meer(&wallet.balance(&address, 2).unwrap());
    assert_eq!(balance.unspent, atoms(0));
    assert_eq!(balance.unconfirmed, atoms(500_000_000));
    assert_eq!(balance.total, atoms(500_000_000));
}

#[test]
fn test_reapplied_block_is_idempotent_and_cursor_monotonic() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let b1 = block(1, vec![funding_tx(1, vec![pay_to(&address, 1_000)])]);
    let b3 = block(3, vec![funding_tx(3, vec![pay_to(&address, 3_000)])]);

    wallet.process_block(&b1).unwrap();
    wallet.process_block(&b3).unwrap();
    let before = wallet.balance(&address, 1).unwrap();

    wallet.process_block(&b1).unwrap();
    wallet.process_block(&block(2, vec![])).unwrap();

    assert_eq!(wallet.synced_to().unwrap().height, 3);
    assert_eq!(wallet.balance(&address, 1).unwrap(), before);
    assert_eq!(meer(&before).total, atoms(4_000));
}

#[test]
fn test_irrelevant_transactions_are_skipped() {
    let (_dir, wallet) = new_wallet();
    let tx = funding_tx(9, vec![pay_to(&foreign_address(), 1_000)]);

    assert!(!wallet.process_mempool_tx(&tx).unwrap());
    assert_eq!(wallet.process_block(&block(1, vec![tx.clone()])).unwrap(), 0);
    assert!(wallet.tx_details(&tx.tx_hash()).unwrap().is_none());
    assert_eq!(wallet.synced_to().unwrap().height, 1);
}

#[test]
fn test_mempool_then_mined() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let tx = funding_tx(1, vec![pay_to(&address, 10_000)]);

    assert!(wallet.process_mempool_tx(&tx).unwrap());
    assert!(!wallet.process_mempool_tx(&tx).unwrap());
    let details = wallet.tx_details(&tx.tx_hash()).unwrap().unwrap();
    assert_eq!(details.height(), -1);
    assert_eq!(meer(&wallet.balance(&address, 1).unwrap()).unconfirmed, atoms(10_000));

    wallet.process_block(&block(1, vec![tx.clone()])).unwrap();
    let details = wallet.tx_details(&tx.tx_hash()).unwrap().unwrap();
    assert_eq!(details.height(), 1);
    assert_eq!(details.credits.len(), 1);
    let balance = meer(&wallet.balance(&address, 1).unwrap());
    assert_eq!(balance.unspent, atoms(10_000));
    assert_eq!(balance.total, atoms(10_000));
}

#[test]
fn test_spend_of_owned_credit_is_a_debit() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let funding = funding_tx(1, vec![pay_to(&address, 10_000)]);
    let spend = spending_tx(
        &[OutPoint::new(funding.tx_hash(), 0)],
        vec![pay_to(&foreign_address(), 9_000)],
    );

    wallet.process_block(&block(1, vec![funding])).unwrap();
    wallet.process_block(&block(2, vec![spend.clone()])).unwrap();

    let details = wallet.tx_details(&spend.tx_hash()).unwrap().unwrap();
    assert!(details.credits.is_empty());
    assert_eq!(details.debits.len(), 1);
    let balance = meer(&wallet.balance(&address, 1).unwrap());
    assert_eq!(balance.spent, atoms(10_000));
    assert_eq!(balance.unspent, atoms(0));
}

#[test]
fn test_conflicting_mempool_spend_is_skipped() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let funding = funding_tx(1, vec![pay_to(&address, 10_000)]);
    let coin = OutPoint::new(funding.tx_hash(), 0);
    let spend = spending_tx(&[coin], vec![pay_to(&address, 9_000)]);

    wallet.process_block(&block(1, vec![funding.clone()])).unwrap();
    wallet.process_block(&block(2, vec![spend.clone()])).unwrap();
    let before = wallet.balance(&address, 1).unwrap();
    assert_eq!(meer(&before).unspent, atoms(9_000));
    assert_eq!(meer(&before).total, atoms(19_000));

    let mut rival = spending_tx(&[coin], vec![pay_to(&address, 8_000)]);
    rival.lock_time = 1;
    assert!(!wallet.process_mempool_tx(&rival).unwrap());

    assert!(wallet.tx_details(&rival.tx_hash()).unwrap().is_none());
    assert_eq!(wallet.balance(&address, 1).unwrap(), before);
    let info = wallet.spend_info(&funding.tx_hash()).unwrap().unwrap();
    assert_eq!(info[0].spent_by, Some((spend.tx_hash(), 0)));
}

#[test]
fn test_second_mempool_spend_of_a_coin_is_skipped() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let funding = funding_tx(1, vec![pay_to(&address, 10_000)]);
    let coin = OutPoint::new(funding.tx_hash(), 0);
    wallet.process_block(&block(1, vec![funding])).unwrap();

    let first = spending_tx(&[coin], vec![pay_to(&foreign_address(), 9_000)]);
    assert!(wallet.process_mempool_tx(&first).unwrap());
    let before = wallet.balance(&address, 1).unwrap();

    let mut second = spending_tx(&[coin], vec![pay_to(&address, 9_500)]);
    second.lock_time = 1;
    assert!(!wallet.process_mempool_tx(&second).unwrap());
    assert_eq!(wallet.balance(&address, 1).unwrap(), before);

    // mined, the second takes the coin from the first
    wallet.process_block(&block(2, vec![second.clone()])).unwrap();
    assert!(wallet.tx_details(&first.tx_hash()).unwrap().is_none());
    let balance = meer(&wallet.balance(&address, 1).unwrap());
    assert_eq!(balance.spent, atoms(10_000));
    assert_eq!(balance.unspent, atoms(9_500));
    assert_eq!(balance.total, atoms(19_500));
}

#[test]
fn test_immature_coinbase_is_locked() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let reward = coinbase_tx(1, vec![pay_to(&address, 1_000_000)]);
    wallet.process_block(&block(1, vec![reward])).unwrap();

    let balance = meer(&wallet.balance(&address, 1).unwrap());
    assert_eq!(balance.locked, atoms(1_000_000));
    assert_eq!(balance.unspent, atoms(0));
    assert_eq!(balance.unconfirmed, atoms(0));
    assert_eq!(balance.total, atoms(1_000_000));

    wallet.unlock(PRIVATE, None).unwrap();
    assert!(matches!(
        wallet.send_pairs(&[(foreign_address(), atoms(10_000))], 0, 1, FEE),
        Err(Error::InsufficientFunds(_))
    ));
}

#[test]
fn test_import_private_key_is_idempotent() {
    let (_dir, wallet) = new_wallet();
    let scope = wallet.default_scope();
    let wif = PrivateKey::generate().to_wif(NetworkType::Testnet);

    let first = wallet.import_private_key(scope, &wif).unwrap();
    let again = wallet.import_private_key(scope, &wif).unwrap();
    assert_eq!(first.address, again.address);
    assert_eq!(
        wallet.account_addresses(scope, u32::MAX).unwrap().len(),
        1
    );

    let mainnet = PrivateKey::generate().to_wif(NetworkType::Mainnet);
    assert!(matches!(
        wallet.import_private_key(scope, &mainnet),
        Err(Error::WrongNetwork(_))
    ));
}

#[test]
fn test_lock_state() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    assert!(wallet.is_locked());
    assert!(matches!(
        wallet.dump_private_key(&address),
        Err(Error::Locked(_))
    ));

    assert!(matches!(
        wallet.unlock(b"wrong", None),
        Err(Error::Crypto(_))
    ));
    wallet.unlock(PRIVATE, None).unwrap();
    assert!(!wallet.is_locked());
    let wif = wallet.dump_private_key(&address).unwrap();

    wallet.lock().unwrap();
    assert!(wallet.is_locked());
    assert!(matches!(
        wallet.dump_private_key(&address),
        Err(Error::Locked(_))
    ));

    // the same passphrase brings back the same key
    wallet.unlock(PRIVATE, None).unwrap();
    assert_eq!(*wallet.dump_private_key(&address).unwrap(), *wif);
    let key = PrivateKey::decode_wif(&wif, wallet.chain_params()).unwrap();
    assert_eq!(
        Address::from_pubkey(&key.public_key_bytes(), NetworkType::Testnet),
        address
    );
}

#[test]
fn test_accounts_and_balances() {
    let (_dir, wallet) = new_wallet();
    let scope = wallet.default_scope();
    wallet.unlock(PRIVATE, None).unwrap();
    let savings = wallet.next_account(scope, "savings").unwrap();
    assert_eq!(savings, 1);
    assert!(matches!(
        wallet.next_account(scope, "savings"),
        Err(Error::DuplicateAccount(_))
    ));
    assert_eq!(wallet.account_number(scope, "savings").unwrap(), 1);

    let default_addr = receive_address(&wallet);
    let savings_addr = wallet.new_address(scope, savings).unwrap().address;
    wallet
        .process_block(&block(
            1,
            vec![funding_tx(
                1,
                vec![pay_to(&default_addr, 1_000), pay_to(&savings_addr, 2_000)],
            )],
        ))
        .unwrap();

    let balances = wallet.account_balances(scope, 1).unwrap();
    let by_name = |name: &str| {
        balances
            .iter()
            .find(|b| b.name == name)
            .map(|b| meer(&b.balances).unspent)
            .unwrap()
    };
    assert_eq!(by_name("default"), atoms(1_000));
    assert_eq!(by_name("savings"), atoms(2_000));
    assert_eq!(
        meer(&wallet.account_balance(scope, savings, 1).unwrap()).total,
        atoms(2_000)
    );
}

#[test]
fn test_send_pairs() {
    let (_dir, wallet) = new_wallet();
    let scope = wallet.default_scope();
    let address = receive_address(&wallet);
    let funding = funding_tx(1, vec![pay_to(&address, 1_000_000_000)]);
    wallet.process_block(&block(1, vec![funding])).unwrap();
    let dest = foreign_address();

    assert!(matches!(
        wallet.send_pairs(&[(dest, atoms(100_000_000))], 0, 1, FEE),
        Err(Error::Locked(_))
    ));

    wallet.unlock(PRIVATE, None).unwrap();
    let hash = wallet
        .send_pairs(&[(dest, atoms(100_000_000))], 0, 1, FEE)
        .unwrap();

    let details = wallet.tx_details(&hash).unwrap().unwrap();
    assert_eq!(details.height(), -1);
    assert_eq!(details.debits.len(), 1);
    assert_eq!(details.credits.len(), 1);
    let change = &details.credits[0];
    assert!(change.is_change);

    let tx = &details.record.tx;
    assert_eq!(tx.outputs.len(), 2);
    assert!(verify_input(tx, 0, &address.pay_script()));
    let fee = 1_000_000_000 - 100_000_000 - change.amount.atoms();
    assert_eq!(
        fee,
        fee_for_serialize_size(FEE, estimate_serialize_size(1, &tx.outputs[..1], true)).atoms()
    );

    let account = meer(&wallet.account_balance(scope, 0, 1).unwrap());
    assert_eq!(account.spent, atoms(1_000_000_000));
    assert_eq!(account.unconfirmed, change.amount);
    assert_eq!(account.unspent, atoms(0));

    // once mined, the change is spendable
    wallet.process_block(&block(2, vec![tx.clone()])).unwrap();
    let account = meer(&wallet.account_balance(scope, 0, 1).unwrap());
    assert_eq!(account.unspent, change.amount);
}

#[test]
fn test_send_folds_dust_change_into_fee() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    wallet
        .process_block(&block(1, vec![funding_tx(1, vec![pay_to(&address, 100_000)])]))
        .unwrap();
    wallet.unlock(PRIVATE, None).unwrap();

    let dest = foreign_address();
    let fee = fee_for_serialize_size(
        FEE,
        estimate_serialize_size(1, &[pay_to(&dest, 0)], true),
    )
    .atoms();
    let send = 100_000 - fee - 100;
    let hash = wallet.send_pairs(&[(dest, atoms(send))], 0, 1, FEE).unwrap();

    let details = wallet.tx_details(&hash).unwrap().unwrap();
    assert_eq!(details.record.tx.outputs.len(), 1);
    assert!(details.credits.is_empty());
    assert_eq!(meer(&wallet.balance(&address, 1).unwrap()).spent, atoms(100_000));
}

#[test]
fn test_failed_sends_record_nothing() {
    let (_dir, wallet) = new_wallet();
    let scope = wallet.default_scope();
    let address = receive_address(&wallet);
    wallet
        .process_block(&block(1, vec![funding_tx(1, vec![pay_to(&address, 1_000_000)])]))
        .unwrap();
    wallet.unlock(PRIVATE, None).unwrap();
    let dest = foreign_address();

    assert!(matches!(
        wallet.send_pairs(&[(dest, atoms(1))], 0, 1, FEE),
        Err(Error::OutputIsDust(_))
    ));
    assert!(matches!(
        wallet.send_pairs(&[(dest, atoms(-5))], 0, 1, FEE),
        Err(Error::NegativeAmount(_))
    ));
    assert!(matches!(
        wallet.send_pairs(&[(dest, atoms(2_000_000))], 0, 1, FEE),
        Err(Error::InsufficientFunds(_))
    ));
    // credits below the confirmation target are not spendable
    assert!(matches!(
        wallet.send_pairs(&[(dest, atoms(10_000))], 0, 6, FEE),
        Err(Error::InsufficientFunds(_))
    ));

    let mainnet = dagwallet_core::Address::from_pubkey(
        &PrivateKey::generate().public_key_bytes(),
        NetworkType::Mainnet,
    );
    assert!(matches!(
        wallet.send_pairs(&[(mainnet, atoms(10_000))], 0, 1, FEE),
        Err(Error::WrongNetwork(_))
    ));

    let mut unmined = 0;
    wallet
        .range_transactions(-1, -1, |batch| {
            unmined += batch.len();
            Ok(false)
        })
        .unwrap();
    assert_eq!(unmined, 0);
    // no change address was issued
    assert_eq!(wallet.accounts(scope).unwrap()[0].internal_count, 0);
    assert_eq!(meer(&wallet.balance(&address, 1).unwrap()).unspent, atoms(1_000_000));
}

#[test]
fn test_bill_and_history_paging() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    for height in 1..=3 {
        let tx = funding_tx(height as u8, vec![pay_to(&address, i64::from(height) * 1_000)]);
        wallet.process_block(&block(height, vec![tx])).unwrap();
    }

    let page = wallet.bill_by_address(&address, TxFilter::All, 0, 2).unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.page, 1);
    let heights: Vec<i32> = page.items.iter().map(|p| p.block_height).collect();
    assert_eq!(heights, vec![3, 2]);

    let second = wallet.bill_by_address(&address, TxFilter::All, 2, 2).unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].variation, atoms(1_000));

    assert!(matches!(
        wallet.bill_by_address(&address, TxFilter::All, 3, 2),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(
        wallet
            .bill_by_address(&address, TxFilter::Out, 0, 0)
            .unwrap()
            .total,
        0
    );
    assert!(matches!(
        wallet.bill_by_address(&foreign_address(), TxFilter::All, 0, 0),
        Err(Error::AddressNotFound(_))
    ));

    let history = wallet
        .list_transactions_by_address(&address, TxFilter::In, -1, 0)
        .unwrap();
    assert_eq!(history.items.len(), 3);
    let confirmations: Vec<i32> = history.items.iter().map(|s| s.confirmations).collect();
    assert_eq!(confirmations, vec![1, 2, 3]);
    assert!(history
        .items
        .iter()
        .all(|s| s.status == TxStatus::Confirmed));
}

#[test]
fn test_rollback_unmines_and_rewinds() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let t1 = funding_tx(1, vec![pay_to(&address, 1_000)]);
    let t2 = funding_tx(2, vec![pay_to(&address, 2_000)]);
    wallet.process_block(&block(1, vec![t1])).unwrap();
    wallet.process_block(&block(2, vec![t2.clone()])).unwrap();

    let stamp = wallet.rollback(1).unwrap();
    assert_eq!(stamp.height, 1);
    assert_eq!(wallet.synced_to().unwrap().height, 1);
    assert_eq!(wallet.tx_details(&t2.tx_hash()).unwrap().unwrap().height(), -1);

    let balance = meer(&wallet.balance(&address, 1).unwrap());
    assert_eq!(balance.unspent, atoms(1_000));
    assert_eq!(balance.unconfirmed, atoms(2_000));

    let history = wallet
        .list_transactions_by_address(&address, TxFilter::All, 0, 0)
        .unwrap();
    assert_eq!(history.items[0].status, TxStatus::Mempool);
}

#[test]
fn test_clear_ledger_resets_cursor() {
    let (_dir, wallet) = new_wallet();
    let address = receive_address(&wallet);
    let tx = funding_tx(1, vec![pay_to(&address, 1_000)]);
    wallet.process_block(&block(1, vec![tx.clone()])).unwrap();

    let stamp = wallet.clear_ledger().unwrap();
    assert_eq!(stamp.height, 0);
    assert_eq!(wallet.synced_to().unwrap().height, 0);
    assert!(wallet.tx_details(&tx.tx_hash()).unwrap().is_none());
    assert!(wallet.balance(&address, 0).unwrap().is_empty());

    // addresses survive, so a resync finds the payment again
    wallet.process_block(&block(1, vec![tx])).unwrap();
    assert_eq!(meer(&wallet.balance(&address, 1).unwrap()).unspent, atoms(1_000));
}
