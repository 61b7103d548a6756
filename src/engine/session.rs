use crate::identity::Identity;
use crate::model::{toggle_membership, SelectionRecord, Selections};

/// Where the active identity's selections stand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nobody is signed in. Selections are empty and toggles are refused.
    Anonymous,
    /// An identity is signed in and its record is being fetched. Toggles apply
    /// locally and are merged into the record once it arrives.
    Loading,
    /// The record was adopted; every toggle is written back.
    Ready,
    /// The record could not be read. Toggles apply locally and each one asks
    /// for the record again; once it is read the toggles are merged in and the
    /// session becomes `Ready`.
    Offline,
}

/// Which selection set a toggle targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Cart,
    Wishlist,
}

/// Handed out when an identity is acquired; only the ticket of the latest
/// transition can complete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub(crate) epoch: u64,
    pub uid: String,
}

/// A toggle made before the identity's record was known, kept as the
/// membership it left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Intent {
    kind: SelectionKind,
    id: String,
    member: bool,
}

/// Remote work a session change asks for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Followup {
    /// Merge this full record for the identity.
    Write(String, SelectionRecord),
    /// Read the record again and merge the pending toggles into it.
    Reconcile(LoadTicket),
}

#[derive(Debug)]
pub(crate) struct Toggled {
    pub member: bool,
    pub followup: Option<Followup>,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Adoption {
    /// A later transition superseded the ticket.
    Stale,
    Adopted(Option<Followup>),
}

#[derive(Debug)]
pub(crate) struct Session {
    identity: Option<Identity>,
    epoch: u64,
    phase: SessionPhase,
    selections: Selections,
    pending: Vec<Intent>,
    reconcile_queued: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            identity: None,
            epoch: 0,
            phase: SessionPhase::Anonymous,
            selections: Selections::default(),
            pending: Vec::new(),
            reconcile_queued: false,
        }
    }
}

fn set_mut(selections: &mut Selections, kind: SelectionKind) -> &mut Vec<String> {
    match kind {
        SelectionKind::Cart => &mut selections.cart,
        SelectionKind::Wishlist => &mut selections.wishlist,
    }
}

impl Session {
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.epoch == self.epoch
    }

    fn ticket(&self) -> Option<LoadTicket> {
        let uid = self.identity.as_ref()?.uid.clone();
        Some(LoadTicket { epoch: self.epoch, uid })
    }

    /// Starts a transition. Selections and pending toggles are dropped before
    /// anything else, and every ticket handed out earlier becomes stale.
    pub fn begin(&mut self, identity: Option<Identity>) -> Option<LoadTicket> {
        self.epoch += 1;
        self.selections.clear();
        self.pending.clear();
        self.reconcile_queued = false;
        self.identity = identity;

        match self.ticket() {
            Some(ticket) => {
                self.phase = SessionPhase::Loading;
                Some(ticket)
            }
            None => {
                self.phase = SessionPhase::Anonymous;
                None
            }
        }
    }

    /// Replaces the selections with `fetched` plus every pending toggle and
    /// returns the write that carries the pending toggles, if any.
    fn settle(&mut self, fetched: Selections) -> Option<Followup> {
        self.selections = fetched;
        for intent in std::mem::take(&mut self.pending) {
            let set = set_mut(&mut self.selections, intent.kind);
            let present = set.contains(&intent.id);
            if present != intent.member {
                toggle_membership(set, &intent.id);
            }
        }
        self.phase = SessionPhase::Ready;
        self.reconcile_queued = false;
        Some(Followup::Write(self.ticket()?.uid, self.selections.to_record()))
    }

    /// Completes a transition with the fetched selections. `None` means the
    /// record could not be read.
    pub fn adopt(&mut self, ticket: &LoadTicket, fetched: Option<Selections>) -> Adoption {
        if !self.is_current(ticket) || self.phase != SessionPhase::Loading {
            return Adoption::Stale;
        }
        match fetched {
            Some(selections) => {
                let had_pending = !self.pending.is_empty();
                let write = self.settle(selections);
                Adoption::Adopted(if had_pending { write } else { None })
            }
            None => {
                self.phase = SessionPhase::Offline;
                Adoption::Adopted(self.request_reconcile())
            }
        }
    }

    fn request_reconcile(&mut self) -> Option<Followup> {
        if self.pending.is_empty() || self.reconcile_queued {
            return None;
        }
        self.reconcile_queued = true;
        self.ticket().map(Followup::Reconcile)
    }

    /// Finishes a reconcile with a freshly read record. `None` when the ticket
    /// is stale or the session is no longer offline.
    pub fn reconcile(&mut self, ticket: &LoadTicket, fetched: Selections) -> Option<Followup> {
        if !self.is_current(ticket) || self.phase != SessionPhase::Offline {
            return None;
        }
        self.settle(fetched)
    }

    /// The record is still unreadable. Pending toggles are kept and the next
    /// toggle asks again.
    pub fn reconcile_failed(&mut self, ticket: &LoadTicket) {
        if self.is_current(ticket) {
            self.reconcile_queued = false;
        }
    }

    pub fn toggle(&mut self, kind: SelectionKind, id: &str) -> Option<Toggled> {
        if self.phase == SessionPhase::Anonymous {
            return None;
        }
        let uid = self.identity.as_ref()?.uid.clone();
        let member = toggle_membership(set_mut(&mut self.selections, kind), id);

        let followup = match self.phase {
            SessionPhase::Ready => Some(Followup::Write(uid, self.selections.to_record())),
            _ => {
                self.pending.push(Intent { kind, id: id.to_string(), member });
                if self.phase == SessionPhase::Offline {
                    self.request_reconcile()
                } else {
                    None
                }
            }
        };
        Some(Toggled { member, followup })
    }
}
