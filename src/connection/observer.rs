//! Observer registration and fan-out
//!
//! Two independent append-only sets: connection-state observers and report
//! observers. Registration never fails, duplicates are allowed, and each
//! registrant is invoked once per event in registration order. There is no
//! deregistration; observers live as long as the manager.

use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

/// Notified once per open/close transition.
pub trait ConnectionObserver: Send + Sync {
    fn connection_changed(&self, connected: bool);
}

/// Notified once per decoded inbound frame, in decode order.
pub trait ReportObserver: Send + Sync {
    fn report_received(&self, report: Bytes);
}

impl<F> ConnectionObserver for F
where
    F: Fn(bool) + Send + Sync,
{
    fn connection_changed(&self, connected: bool) {
        self(connected)
    }
}

impl<F> ReportObserver for F
where
    F: Fn(Bytes) + Send + Sync,
{
    fn report_received(&self, report: Bytes) {
        self(report)
    }
}

#[derive(Default)]
pub(crate) struct ObserverSet {
    connection: Mutex<Vec<Arc<dyn ConnectionObserver>>>,
    reports: Mutex<Vec<Arc<dyn ReportObserver>>>,
}

impl ObserverSet {
    pub fn add_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        lock(&self.connection).push(observer);
    }

    pub fn add_report_observer(&self, observer: Arc<dyn ReportObserver>) {
        lock(&self.reports).push(observer);
    }

    pub fn notify_connection(&self, connected: bool) {
        let observers = lock(&self.connection).clone();
        for observer in &observers {
            observer.connection_changed(connected);
        }
    }

    pub fn notify_report(&self, report: Bytes) {
        let observers = lock(&self.reports).clone();
        for observer in &observers {
            observer.report_received(report.clone());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observers_invoked_in_registration_order() {
        let set = ObserverSet::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            set.add_connection_observer(Arc::new(move |connected: bool| {
                seen.lock().unwrap().push((tag, connected));
            }));
        }

        set.notify_connection(true);
        set.notify_connection(false);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                ("first", true),
                ("second", true),
                ("first", false),
                ("second", false)
            ]
        );
    }

    #[test]
    fn duplicate_registration_invoked_per_registration() {
        let set = ObserverSet::default();
        let count = Arc::new(Mutex::new(0usize));

        let observer: Arc<dyn ReportObserver> = {
            let count = count.clone();
            Arc::new(move |_report: Bytes| {
                *count.lock().unwrap() += 1;
            })
        };
        set.add_report_observer(observer.clone());
        set.add_report_observer(observer);

        set.notify_report(Bytes::from_static(&[1]));
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
