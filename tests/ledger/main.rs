
use std::collections::HashSet;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use offer_ledger::{
    BatchVeto, InMemoryStorage, InvoiceRef, LedgerConfig, LedgerError, Operation,
    RedemptionLedger, RedemptionRecord, StorageError, SubscriberError, WriteLock,
};
use support::{init_tracing, offer, SpyStorage};
use uuid::Uuid;

fn veto(ledger: &RedemptionLedger<impl offer_ledger::Storage>, operation: Operation) {
    ledger.bus().before(operation, |pending| {
        pending.cancel();
        Ok(())
    });
}

#[test]
fn create_then_get_by_key_returns_same_fields() {
    let ledger = RedemptionLedger::new(InMemoryStorage::new());
    let offer = offer("SAVE10");
    let invoice = Uuid::new_v4();

    let record = ledger.create(&offer, invoice).unwrap();
    let loaded = ledger.get_by_key(record.key()).unwrap().unwrap();

    assert_eq!(loaded.offer_code(), "SAVE10");
    assert_eq!(loaded.offer_provider_key(), offer.offer_provider_key);
    assert_eq!(loaded.invoice_key(), invoice);
    assert_eq!(loaded.offer_settings_key(), offer.offer_settings_key);
    assert_eq!(loaded.customer_key(), None);
}

#[test]
fn redeemed_offer_is_found_by_invoice() {
    let ledger = RedemptionLedger::new(InMemoryStorage::new());
    let settings = Uuid::new_v4();
    let customer = Uuid::new_v4();
    let invoice = Uuid::new_v4();
    let offer = offer_ledger::OfferContext::new("SAVE10", Uuid::new_v4(), settings);

    let record = ledger
        .create(&offer, InvoiceRef::for_customer(invoice, customer))
        .unwrap();
    assert!(!record.was_cancelled());

    let found = ledger.get_by_invoice_key(invoice).unwrap();
    assert_eq!(found, vec![record]);
}

#[test]
fn vetoed_create_never_touches_storage() {
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    veto(&ledger, Operation::Create);

    let record = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();

    assert!(record.was_cancelled());
    assert_eq!(storage.opened(), 0);
    assert_eq!(storage.commits(), 0);
    assert!(ledger.get_by_key(record.key()).unwrap().is_none());
}

#[test]
fn created_listener_sees_persisted_record() {
    let ledger = Arc::new(RedemptionLedger::new(InMemoryStorage::new()));
    let found = Arc::new(Mutex::new(None));

    let reader = Arc::downgrade(&ledger);
    let sink = Arc::clone(&found);
    ledger.bus().after(Operation::Create, move |completed| {
        let ledger = reader
            .upgrade()
            .ok_or_else(|| SubscriberError::new("ledger dropped"))?;
        let key = completed.records()[0].key();
        let stored = ledger
            .get_by_key(key)
            .map_err(|e| SubscriberError::new(e.to_string()))?;
        *sink.lock().unwrap() = stored;
        Ok(())
    });

    let record = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();
    assert_eq!(*found.lock().unwrap(), Some(record));
}

#[test]
fn saving_twice_keeps_one_row_with_latest_values() {
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    let mut record = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();

    record.set_extended("channel", "web");
    ledger.save(&mut record).unwrap();
    record.set_extended("channel", "pos");
    ledger.save(&mut record).unwrap();

    assert_eq!(storage.rows(), 1);
    let loaded = ledger.get_by_key(record.key()).unwrap().unwrap();
    assert_eq!(
        loaded.extended_data().get("channel").map(String::as_str),
        Some("pos")
    );
    assert_eq!(loaded, record);
}

#[test]
fn save_inserts_a_record_built_outside_the_ledger() {
    let ledger = RedemptionLedger::new(InMemoryStorage::new());
    let mut record = RedemptionRecord::new(&offer("WELCOME"), Uuid::new_v4().into());

    ledger.save(&mut record).unwrap();

    assert!(ledger.get_by_key(record.key()).unwrap().is_some());
}

#[test]
fn vetoed_save_does_not_commit() {
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    let mut record = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();
    let commits = storage.commits();
    veto(&ledger, Operation::Save);

    record.set_extended("channel", "web");
    ledger.save(&mut record).unwrap();

    assert!(record.was_cancelled());
    assert_eq!(storage.commits(), commits);
    let loaded = ledger.get_by_key(record.key()).unwrap().unwrap();
    assert!(loaded.extended_data().is_empty());
}

#[test]
fn vetoed_delete_keeps_the_record() {
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    let mut record = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();
    let commits = storage.commits();
    veto(&ledger, Operation::Delete);

    ledger.delete(&mut record).unwrap();

    assert!(record.was_cancelled());
    assert_eq!(storage.commits(), commits);
    assert!(ledger.get_by_key(record.key()).unwrap().is_some());
}

#[test]
fn delete_removes_the_record() {
    let ledger = RedemptionLedger::new(InMemoryStorage::new());
    let invoice = Uuid::new_v4();
    let mut record = ledger.create(&offer("SAVE10"), invoice).unwrap();

    ledger.delete(&mut record).unwrap();

    assert!(!record.was_cancelled());
    assert!(ledger.get_by_key(record.key()).unwrap().is_none());
    assert!(ledger.get_by_invoice_key(invoice).unwrap().is_empty());
}

#[test]
fn batch_save_is_all_or_nothing() {
    init_tracing();
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    let saved = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&saved);
    ledger.bus().after(Operation::Save, move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    let offer = offer("BULK");
    let mut records: Vec<RedemptionRecord> = (0..3)
        .map(|_| RedemptionRecord::new(&offer, Uuid::new_v4().into()))
        .collect();
    storage.reject(Some(records[1].key()));

    let err = ledger.save_all(&mut records).unwrap_err();

    assert!(matches!(
        err,
        LedgerError::Storage(StorageError::Rejected { key, .. }) if key == records[1].key()
    ));
    assert_eq!(storage.rows(), 0);
    assert_eq!(storage.commits(), 0);
    assert_eq!(*saved.lock().unwrap(), 0);
    assert!(!ledger.write_lock().is_held());

    storage.reject(None);
    ledger.save_all(&mut records).unwrap();
    assert_eq!(storage.rows(), 3);
    assert_eq!(storage.commits(), 1);
    assert_eq!(*saved.lock().unwrap(), 1);
}

#[test]
fn failed_save_leaves_update_dates_untouched() {
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    let offer = offer("BULK");

    let mut single = ledger.create(&offer, Uuid::new_v4()).unwrap();
    let before = single.update_date();
    storage.reject(Some(single.key()));
    assert!(ledger.save(&mut single).is_err());
    assert_eq!(single.update_date(), before);
    assert_eq!(
        ledger.get_by_key(single.key()).unwrap().unwrap().update_date(),
        before
    );

    let mut records: Vec<RedemptionRecord> = (0..3)
        .map(|_| RedemptionRecord::new(&offer, Uuid::new_v4().into()))
        .collect();
    let before: Vec<_> = records.iter().map(|r| r.update_date()).collect();
    storage.reject(Some(records[2].key()));
    assert!(ledger.save_all(&mut records).is_err());
    let after: Vec<_> = records.iter().map(|r| r.update_date()).collect();
    assert_eq!(after, before);

    storage.reject(None);
    ledger.save(&mut single).unwrap();
    assert!(single.update_date() >= single.create_date());
    assert_eq!(ledger.get_by_key(single.key()).unwrap().unwrap(), single);
}

#[test]
fn commit_failure_propagates_and_releases_the_lock() {
    init_tracing();
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    let created = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&created);
    ledger.bus().after(Operation::Create, move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    storage.set_fail_commit(true);
    let commit_timed_out =
        LedgerError::Storage(StorageError::Unavailable("commit timed out".into()));

    let err = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap_err();
    assert_eq!(err, commit_timed_out);
    assert!(!ledger.write_lock().is_held());

    let offer = offer("BULK");
    let mut records: Vec<RedemptionRecord> = (0..3)
        .map(|_| RedemptionRecord::new(&offer, Uuid::new_v4().into()))
        .collect();
    let err = ledger.save_all(&mut records).unwrap_err();
    assert_eq!(err, commit_timed_out);
    assert!(!ledger.write_lock().is_held());

    assert_eq!(storage.rows(), 0);
    assert_eq!(storage.commits(), 0);
    assert_eq!(*created.lock().unwrap(), 0);

    storage.set_fail_commit(false);
    ledger.save_all(&mut records).unwrap();
    assert_eq!(storage.rows(), 3);
}

#[test]
fn reads_do_not_take_the_write_lock() {
    let ledger = Arc::new(RedemptionLedger::new(InMemoryStorage::new()));
    let invoice = Uuid::new_v4();
    let record = ledger.create(&offer("SAVE10"), invoice).unwrap();

    let _guard = ledger.write_lock().write().unwrap();

    assert_eq!(ledger.get_by_key(record.key()).unwrap(), Some(record.clone()));
    assert_eq!(ledger.get_by_invoice_key(invoice).unwrap().len(), 1);

    let (tx, rx) = mpsc::channel();
    let reader = Arc::clone(&ledger);
    let key = record.key();
    let handle = thread::spawn(move || {
        let found = reader.get_by_key(key).map(|r| r.is_some());
        let by_invoice = reader.get_by_invoice_key(invoice).map(|r| r.len());
        let _ = tx.send((found, by_invoice));
    });

    let (found, by_invoice) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(found, Ok(true));
    assert_eq!(by_invoice, Ok(1));
    assert!(ledger.write_lock().is_held());
    handle.join().unwrap();
}

#[test]
fn batch_delete_is_all_or_nothing() {
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    let offer = offer("BULK");
    let mut records: Vec<RedemptionRecord> = (0..3)
        .map(|_| ledger.create(&offer, Uuid::new_v4()).unwrap())
        .collect();
    storage.reject(Some(records[2].key()));

    assert!(ledger.delete_all(&mut records).is_err());
    assert_eq!(storage.rows(), 3);

    storage.reject(None);
    ledger.delete_all(&mut records).unwrap();
    assert_eq!(storage.rows(), 0);
    assert!(ledger
        .get_by_offer_settings_key(offer.offer_settings_key)
        .unwrap()
        .is_empty());
}

#[test]
fn batch_pre_event_is_informational_by_default() {
    let ledger = RedemptionLedger::new(InMemoryStorage::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    ledger.bus().before(Operation::Save, move |pending| {
        sink.lock()
            .unwrap()
            .push((pending.is_batch(), pending.is_cancellable(), pending.records().len()));
        pending.cancel();
        Ok(())
    });

    let offer = offer("BULK");
    let mut records = vec![
        RedemptionRecord::new(&offer, Uuid::new_v4().into()),
        RedemptionRecord::new(&offer, Uuid::new_v4().into()),
    ];
    ledger.save_all(&mut records).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(true, false, 2)]);
    assert!(records.iter().all(|r| !r.was_cancelled()));
    assert_eq!(
        ledger
            .get_by_offer_settings_key(offer.offer_settings_key)
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn honored_batch_veto_skips_storage() {
    let storage = SpyStorage::new();
    let config = LedgerConfig {
        batch_veto: BatchVeto::Honor,
        ..LedgerConfig::default()
    };
    let ledger = RedemptionLedger::new(storage.clone()).with_config(config);
    let offer = offer("BULK");
    let mut records: Vec<RedemptionRecord> = (0..2)
        .map(|_| ledger.create(&offer, Uuid::new_v4()).unwrap())
        .collect();
    let commits = storage.commits();
    veto(&ledger, Operation::Delete);

    ledger.delete_all(&mut records).unwrap();

    assert!(records.iter().all(RedemptionRecord::was_cancelled));
    assert_eq!(storage.commits(), commits);
    assert_eq!(storage.rows(), 2);
}

#[test]
fn concurrent_creates_all_commit_with_distinct_keys() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 25;
    init_tracing();

    let storage = InMemoryStorage::new();
    let ledger = Arc::new(RedemptionLedger::new(storage.clone()));
    let settings = Uuid::new_v4();
    let offer = offer_ledger::OfferContext::new("RUSH", Uuid::new_v4(), settings);

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let offer = offer.clone();
            thread::spawn(move || {
                (0..PER_THREAD)
                    .map(|_| ledger.create(&offer, Uuid::new_v4()).unwrap().key())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let keys: HashSet<Uuid> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(keys.len(), THREADS * PER_THREAD);
    assert_eq!(storage.len().unwrap(), THREADS * PER_THREAD);
    assert_eq!(storage.commit_count(), (THREADS * PER_THREAD) as u64);
    assert_eq!(
        ledger.get_by_offer_settings_key(settings).unwrap().len(),
        THREADS * PER_THREAD
    );
}

#[test]
fn ledgers_sharing_a_lock_serialize_against_each_other() {
    let lock = Arc::new(WriteLock::new());
    let storage = InMemoryStorage::new();
    let first = Arc::new(RedemptionLedger::new(storage.clone()).with_lock(Arc::clone(&lock)));
    let second = Arc::new(RedemptionLedger::new(storage.clone()).with_lock(Arc::clone(&lock)));
    assert!(Arc::ptr_eq(first.write_lock(), second.write_lock()));

    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|ledger| {
            thread::spawn(move || {
                let offer = offer("SHARED");
                for _ in 0..20 {
                    ledger.create(&offer, Uuid::new_v4()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(storage.len().unwrap(), 40);
    assert!(!lock.is_held());
}

#[test]
fn offer_settings_and_customer_filter_is_an_intersection() {
    let ledger = RedemptionLedger::new(InMemoryStorage::new());
    let settings_a = Uuid::new_v4();
    let settings_b = Uuid::new_v4();
    let customer_a = Uuid::new_v4();
    let customer_b = Uuid::new_v4();
    let provider = Uuid::new_v4();
    let offer_a = offer_ledger::OfferContext::new("A", provider, settings_a);
    let offer_b = offer_ledger::OfferContext::new("B", provider, settings_b);

    let aa = ledger
        .create(&offer_a, InvoiceRef::for_customer(Uuid::new_v4(), customer_a))
        .unwrap();
    ledger
        .create(&offer_a, InvoiceRef::for_customer(Uuid::new_v4(), customer_b))
        .unwrap();
    ledger
        .create(&offer_b, InvoiceRef::for_customer(Uuid::new_v4(), customer_a))
        .unwrap();
    ledger.create(&offer_a, Uuid::new_v4()).unwrap();

    let both = ledger
        .get_by_offer_settings_key_and_customer_key(settings_a, customer_a)
        .unwrap();
    assert_eq!(both, vec![aa.clone()]);

    let by_settings: HashSet<Uuid> = ledger
        .get_by_offer_settings_key(settings_a)
        .unwrap()
        .iter()
        .map(RedemptionRecord::key)
        .collect();
    let by_customer: HashSet<Uuid> = ledger
        .get_by_customer_key(customer_a)
        .unwrap()
        .iter()
        .map(RedemptionRecord::key)
        .collect();
    let intersection: HashSet<Uuid> = by_settings.intersection(&by_customer).copied().collect();
    assert_eq!(intersection, HashSet::from([aa.key()]));

    assert_eq!(by_settings.len(), 3);
    assert_eq!(by_customer.len(), 2);
    assert_eq!(ledger.get_by_offer_provider_key(provider).unwrap().len(), 4);
    assert!(ledger.get_by_offer_provider_key(Uuid::new_v4()).unwrap().is_empty());
}

#[test]
fn notifications_run_outside_the_write_lock() {
    let ledger = RedemptionLedger::new(InMemoryStorage::new());
    let held = Arc::new(Mutex::new(Vec::new()));

    for operation in [Operation::Create, Operation::Save, Operation::Delete] {
        let lock = Arc::clone(ledger.write_lock());
        let sink = Arc::clone(&held);
        ledger.bus().before(operation, move |_| {
            sink.lock().unwrap().push(lock.is_held());
            Ok(())
        });
        let lock = Arc::clone(ledger.write_lock());
        let sink = Arc::clone(&held);
        ledger.bus().after(operation, move |_| {
            sink.lock().unwrap().push(lock.is_held());
            Ok(())
        });
    }

    let mut record = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();
    ledger.save(&mut record).unwrap();
    ledger.delete(&mut record).unwrap();

    let held = held.lock().unwrap();
    assert_eq!(held.len(), 6);
    assert!(held.iter().all(|h| !h));
}

#[test]
fn listener_may_write_through_the_ledger() {
    let ledger = Arc::new(RedemptionLedger::new(InMemoryStorage::new()));
    let follow_up = offer("FOLLOW_UP");
    let settings = follow_up.offer_settings_key;

    let writer = Arc::downgrade(&ledger);
    ledger.bus().after(Operation::Create, move |completed| {
        let created = &completed.records()[0];
        if created.offer_code() != "SAVE10" {
            return Ok(());
        }
        let ledger = writer
            .upgrade()
            .ok_or_else(|| SubscriberError::new("ledger dropped"))?;
        ledger
            .create(&follow_up, created.invoice_key())
            .map_err(|e| SubscriberError::new(e.to_string()))?;
        Ok(())
    });

    let record = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();

    let chained = ledger.get_by_offer_settings_key(settings).unwrap();
    assert_eq!(chained.len(), 1);
    assert_eq!(chained[0].invoice_key(), record.invoice_key());
}

#[test]
fn lifecycle_events_fire_in_order() {
    let ledger = RedemptionLedger::new(InMemoryStorage::new());
    let events = Arc::new(Mutex::new(Vec::new()));

    for operation in [Operation::Create, Operation::Save, Operation::Delete] {
        let sink = Arc::clone(&events);
        ledger.bus().before(operation, move |pending| {
            sink.lock().unwrap().push(pending.event());
            Ok(())
        });
        let sink = Arc::clone(&events);
        ledger.bus().after(operation, move |completed| {
            sink.lock().unwrap().push(completed.event());
            Ok(())
        });
    }

    let mut record = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();
    ledger.save(&mut record).unwrap();
    ledger.delete(&mut record).unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["creating", "created", "saving", "saved", "deleting", "deleted"]
    );
}

#[test]
fn storage_failure_propagates_and_releases_the_lock() {
    init_tracing();
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    storage.set_unavailable(true);

    let err = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap_err();
    assert_eq!(
        err,
        LedgerError::Storage(StorageError::Unavailable("connection refused".into()))
    );
    assert!(!ledger.write_lock().is_held());
    assert!(ledger.get_by_invoice_key(Uuid::new_v4()).is_err());

    storage.set_unavailable(false);
    ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap();
    assert_eq!(storage.rows(), 1);
}

#[test]
fn failing_pre_listener_aborts_the_write() {
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    ledger
        .bus()
        .before(Operation::Create, |_| Err(SubscriberError::new("fraud check offline")));

    let err = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap_err();

    assert_eq!(
        err,
        LedgerError::Subscriber {
            event: "creating",
            source: SubscriberError::new("fraud check offline"),
        }
    );
    assert_eq!(storage.opened(), 0);
}

#[test]
fn failing_post_listener_reports_after_commit() {
    let storage = SpyStorage::new();
    let ledger = RedemptionLedger::new(storage.clone());
    ledger
        .bus()
        .after(Operation::Create, |_| Err(SubscriberError::new("mailer offline")));

    let err = ledger.create(&offer("SAVE10"), Uuid::new_v4()).unwrap_err();

    assert!(matches!(err, LedgerError::Subscriber { event: "created", .. }));
    assert_eq!(storage.rows(), 1);
}
