//! Change sets produced by placement.
//!
//! Placement never mutates a playground directly. It returns a [`ChangeSet`]
//! that the caller applies once it holds every affected playground. A change
//! set is validated against all of its targets before the first mutation, so
//! it commits completely or not at all.

use std::collections::BTreeSet;

use super::aggregate::Playground;
use super::errors::PlaygroundError;
use crate::domain::order::OrderRecord;
use crate::domain::shared::{OrderRef, PlaygroundId};

/// Looks up playgrounds the caller has already locked.
pub trait PlaygroundResolver {
    /// Mutable access to a locked playground.
    fn resolve(&mut self, id: &PlaygroundId) -> Option<&mut Playground>;
}

/// One mutation of one or more playgrounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Append a pending order to its playground.
    AppendOrder(OrderRecord),
    /// Append reconcile orders, plus closing orders in peer live playgrounds.
    Mirror {
        /// Reconcile playground.
        reconcile_playground_id: PlaygroundId,
        /// New reconcile orders, close leg first.
        orders: Vec<OrderRecord>,
        /// Closing orders for other live playgrounds.
        peer_closes: Vec<OrderRecord>,
    },
    /// Link live orders and reconcile orders in both directions.
    LinkReconciles(Vec<(OrderRef, OrderRef)>),
}

impl Change {
    /// Short description for logs.
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::AppendOrder(_) => "append order",
            Self::Mirror { .. } => "mirror into reconcile playground",
            Self::LinkReconciles(_) => "link reconcile orders",
        }
    }

    fn new_orders(&self) -> Vec<&OrderRecord> {
        match self {
            Self::AppendOrder(order) => vec![order],
            Self::Mirror {
                orders,
                peer_closes,
                ..
            } => orders.iter().chain(peer_closes).collect(),
            Self::LinkReconciles(_) => Vec::new(),
        }
    }
}

/// An ordered set of changes that commit together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// Empty change set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    /// Add a change.
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Changes in application order.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Every new order in the set.
    #[must_use]
    pub fn new_orders(&self) -> Vec<&OrderRecord> {
        self.changes.iter().flat_map(Change::new_orders).collect()
    }

    /// Every playground the set touches, in ascending id order.
    #[must_use]
    pub fn playgrounds(&self) -> Vec<PlaygroundId> {
        let mut ids = BTreeSet::new();
        for order in self.new_orders() {
            ids.insert(order.playground_id().clone());
        }
        for change in &self.changes {
            match change {
                Change::Mirror {
                    reconcile_playground_id,
                    ..
                } => {
                    ids.insert(reconcile_playground_id.clone());
                }
                Change::LinkReconciles(links) => {
                    for (live, reconcile) in links {
                        ids.insert(live.playground_id.clone());
                        ids.insert(reconcile.playground_id.clone());
                    }
                }
                Change::AppendOrder(_) => {}
            }
        }
        ids.into_iter().collect()
    }

    /// Validate against every target, then apply. Returns the new orders'
    /// addresses.
    pub fn apply<R: PlaygroundResolver + ?Sized>(
        self,
        resolver: &mut R,
    ) -> Result<Vec<OrderRef>, PlaygroundError> {
        self.validate(resolver)?;

        let created: Vec<OrderRef> = self.new_orders().iter().map(|o| o.order_ref()).collect();

        for change in self.changes {
            match change {
                Change::AppendOrder(order) => append(resolver, order)?,
                Change::Mirror {
                    orders,
                    peer_closes,
                    ..
                } => {
                    for order in orders.into_iter().chain(peer_closes) {
                        append(resolver, order)?;
                    }
                }
                Change::LinkReconciles(links) => {
                    for (live, reconcile) in links {
                        link(resolver, &live, reconcile.clone())?;
                        link(resolver, &reconcile, live)?;
                    }
                }
            }
        }

        Ok(created)
    }

    fn validate<R: PlaygroundResolver + ?Sized>(&self, resolver: &mut R) -> Result<(), PlaygroundError> {
        let created: BTreeSet<OrderRef> =
            self.new_orders().iter().map(|o| o.order_ref()).collect();

        for id in self.playgrounds() {
            if resolver.resolve(&id).is_none() {
                return Err(PlaygroundError::PlaygroundNotFound(id));
            }
        }

        for order in self.new_orders() {
            let playground = resolve(resolver, order.playground_id())?;
            playground.can_append(order)?;
        }

        for change in &self.changes {
            let Change::LinkReconciles(links) = change else {
                continue;
            };
            for target in links.iter().flat_map(|(a, b)| [a, b]) {
                if created.contains(target) {
                    continue;
                }
                let playground = resolve(resolver, &target.playground_id)?;
                if playground.order(&target.order_id).is_none() {
                    return Err(PlaygroundError::OrderNotFound {
                        playground_id: target.playground_id.clone(),
                        order_id: target.order_id.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

fn resolve<'a, R: PlaygroundResolver + ?Sized>(
    resolver: &'a mut R,
    id: &PlaygroundId,
) -> Result<&'a mut Playground, PlaygroundError> {
    resolver
        .resolve(id)
        .ok_or_else(|| PlaygroundError::PlaygroundNotFound(id.clone()))
}

fn append<R: PlaygroundResolver + ?Sized>(
    resolver: &mut R,
    order: OrderRecord,
) -> Result<(), PlaygroundError> {
    let playground = resolve(resolver, order.playground_id())?;
    playground.append_order(order)
}

fn link<R: PlaygroundResolver + ?Sized>(
    resolver: &mut R,
    from: &OrderRef,
    to: OrderRef,
) -> Result<(), PlaygroundError> {
    let playground = resolve(resolver, &from.playground_id)?;
    playground.link_reconcile(&from.order_id, to)
}

/// Resolver over a plain list of playgrounds; handy for tests and
/// single-threaded drivers.
impl PlaygroundResolver for [Playground] {
    fn resolve(&mut self, id: &PlaygroundId) -> Option<&mut Playground> {
        self.iter_mut().find(|p| p.id() == id)
    }
}
