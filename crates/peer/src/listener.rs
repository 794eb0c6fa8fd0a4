//! Listener-Verwaltung fuer Push-Events (Nachrichten, Remote-Streams)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Callback fuer ein Event vom Typ `T`
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Menge registrierter Listener
///
/// Jeder Listener bekommt jedes Event (Fan-out). Die Reihenfolge der
/// Registrierung bleibt erhalten.
pub(crate) struct ListenerSet<T> {
    eintraege: Mutex<Vec<(u64, Listener<T>)>>,
    naechste_id: AtomicU64,
}

impl<T: 'static> ListenerSet<T> {
    pub(crate) fn neu() -> Arc<Self> {
        Arc::new(Self {
            eintraege: Mutex::new(Vec::new()),
            naechste_id: AtomicU64::new(1),
        })
    }

    /// Registriert einen Listener und liefert das passende Abmelde-Handle
    pub(crate) fn hinzufuegen(self: &Arc<Self>, listener: Listener<T>) -> Subscription {
        let id = self.naechste_id.fetch_add(1, Ordering::Relaxed);
        self.eintraege.lock().push((id, listener));

        let menge: Weak<Self> = Arc::downgrade(self);
        Subscription::neu(move || menge.upgrade().map(|m| m.entfernen(id)).unwrap_or(false))
    }

    fn entfernen(&self, id: u64) -> bool {
        let mut eintraege = self.eintraege.lock();
        let vorher = eintraege.len();
        eintraege.retain(|(eid, _)| *eid != id);
        eintraege.len() != vorher
    }

    /// Kopie der aktuellen Listener (Aufruf ohne gehaltenen Lock)
    pub(crate) fn schnappschuss(&self) -> Vec<Listener<T>> {
        self.eintraege.lock().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub(crate) fn leeren(&self) {
        self.eintraege.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.eintraege.lock().len()
    }
}

/// Abmelde-Handle eines Listeners
///
/// Das Abmelden ist explizit: ein fallengelassenes `Subscription` laesst den
/// Listener registriert.
pub struct Subscription {
    entferner: Option<Box<dyn FnOnce() -> bool + Send + Sync>>,
}

impl Subscription {
    fn neu(entferner: impl FnOnce() -> bool + Send + Sync + 'static) -> Self {
        Self {
            entferner: Some(Box::new(entferner)),
        }
    }

    /// Handle ohne registrierten Listener (z.B. unbekannter Peer)
    pub fn leer() -> Self {
        Self { entferner: None }
    }

    /// Entfernt den Listener. Liefert `true` wenn er noch registriert war.
    pub fn unsubscribe(mut self) -> bool {
        self.entferner.take().map(|f| f()).unwrap_or(false)
    }

    pub fn ist_leer(&self) -> bool {
        self.entferner.is_none()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("leer", &self.ist_leer())
            .finish()
    }
}
