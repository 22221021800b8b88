#![forbid(unsafe_code)]

//! Links between cells.
//!
//! [`Value::link`] couples two cells in both directions: each cell forwards
//! its notifications to the other, and each cell's validator chain consults
//! the other's, so a value one side would reject never reaches either.
//! [`Value::link_observable`] makes a cell follow an [`Observable`] with no
//! reverse propagation; the source's chain consults the follower's, so the
//! source refuses any value its followers would refuse.
//!
//! Every cell keeps the edge list of its own links. Linking walks the
//! partner's component first and refuses the edge if this cell is already
//! reachable, so the link graph stays a forest.
//!
//! The forwarding consumer a link installs in one cell's registry is held
//! weakly there; the strong handle lives in the edge record of the cell it
//! forwards to. Dropping that cell therefore drops the consumer, and the
//! survivor prunes the dead record and cross-validator on its next commit or
//! link.
//!
//! # Invariants
//!
//! 1. At most one link between any pair of cells, in either direction.
//! 2. The undirected link graph never contains a cycle.
//! 3. `unlink` removes exactly the validators and consumers its `link`
//!    installed; other links of either cell are untouched.
//! 4. A propagated update does not bounce back through the link it arrived on.
//! 5. A dropped partner leaves nothing behind once the survivor has pruned.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | [`LinkError::SelfLink`] | Linking a cell to itself or its own observable | Nothing changes |
//! | [`LinkError::AlreadyLinked`] | The pair already has a link | Nothing changes |
//! | [`LinkError::Cycle`] | The partner is already reachable | Nothing changes |
//! | [`LinkError::NotLinked`] | `unlink` of a pair without a link | Nothing changes |
//! | [`LinkError::Detached`] | The observable's cell is gone | Nothing changes |
//! | Seed rejected | This cell refuses the partner's current value | Link rolled back, error returned |
//! | Follower refuses a source value | Validator or lock on the follower | The source's `set` fails, nothing changes |

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::{LinkError, ValueError};
use crate::event::{Consumer, Observer};
use crate::lock;
use crate::observable::Observable;
use crate::validator::ChainEntry;
use crate::value::{CellId, Value, ValueInner, ValueType};

/// Serializes every change to the link graph, so cycle detection sees a
/// consistent picture.
static GRAPH: Mutex<()> = Mutex::new(());

/// Identity of one `link` call; tags the records and validators it installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct LinkId(u64);

impl LinkId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which end of a link a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// The cell `link` was called on.
    Linked,
    /// The cell passed to `link`.
    Original,
    /// A cell following an observable.
    Follower,
    /// The cell behind a followed observable.
    Source,
}

impl Role {
    fn is_bidirectional(self) -> bool {
        matches!(self, Self::Linked | Self::Original)
    }
}

/// One edge, as seen from one of its cells.
pub(crate) struct LinkRecord<T> {
    id: LinkId,
    partner: Weak<ValueInner<T>>,
    partner_id: CellId,
    role: Role,
    /// Owns the consumer the partner's registry holds weakly, which forwards
    /// the partner's values to this cell.
    inbound: Option<Consumer<Option<T>>>,
}

impl<T> LinkRecord<T> {
    fn new(id: LinkId, partner: &Arc<ValueInner<T>>, role: Role) -> Self {
        Self {
            id,
            partner: Arc::downgrade(partner),
            partner_id: partner.id,
            role,
            inbound: None,
        }
    }

    fn is_alive(&self) -> bool {
        self.partner.strong_count() > 0
    }
}

// ---------------------------------------------------------------------------
// Graph bookkeeping
// ---------------------------------------------------------------------------

/// Drop the records and cross-validators of links whose partner is gone.
pub(crate) fn prune<T: ValueType>(cell: &ValueInner<T>) {
    let dead: Vec<LinkId> = {
        let mut links = lock(&cell.links);
        if links.iter().all(LinkRecord::is_alive) {
            return;
        }
        let dead = links
            .iter()
            .filter(|record| !record.is_alive())
            .map(|record| record.id)
            .collect();
        links.retain(LinkRecord::is_alive);
        dead
    };
    tracing::debug!(cell = ?cell.id, pruned = dead.len(), "dead links pruned");
    for id in dead {
        cell.remove_link_validators(id);
    }
}

/// Validate and record a new edge between `this` and `partner`.
fn reserve<T: ValueType>(
    this: &Arc<ValueInner<T>>,
    partner: &Arc<ValueInner<T>>,
    this_role: Role,
    partner_role: Role,
) -> Result<LinkId, LinkError> {
    if this.id == partner.id {
        return Err(LinkError::SelfLink);
    }
    let _graph = lock(&GRAPH);
    prune(this);
    prune(partner);
    if lock(&this.links)
        .iter()
        .any(|record| record.partner_id == partner.id)
    {
        return Err(LinkError::AlreadyLinked);
    }
    if reachable(partner, this.id) {
        return Err(LinkError::Cycle);
    }
    let id = LinkId::next();
    lock(&this.links).push(LinkRecord::new(id, partner, this_role));
    lock(&partner.links).push(LinkRecord::new(id, this, partner_role));
    Ok(id)
}

/// Depth-first search over live link edges. Caller holds `GRAPH`.
fn reachable<T: ValueType>(from: &Arc<ValueInner<T>>, target: CellId) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![Arc::clone(from)];
    while let Some(cell) = stack.pop() {
        if cell.id == target {
            return true;
        }
        if !visited.insert(cell.id) {
            continue;
        }
        stack.extend(
            lock(&cell.links)
                .iter()
                .filter_map(|record| record.partner.upgrade()),
        );
    }
    false
}

/// Remove and return the record of link `id` from `cell`. Caller holds `GRAPH`.
fn detach<T>(cell: &ValueInner<T>, id: LinkId) -> Option<LinkRecord<T>> {
    let mut links = lock(&cell.links);
    let index = links.iter().position(|record| record.id == id)?;
    Some(links.remove(index))
}

fn rollback<T>(a: &ValueInner<T>, b: &ValueInner<T>, id: LinkId) {
    let _graph = lock(&GRAPH);
    detach(a, id);
    detach(b, id);
}

/// Hand `consumer` to the record of link `id` on `owner` and register it
/// weakly on `registry`.
fn attach<T: ValueType>(
    owner: &ValueInner<T>,
    id: LinkId,
    consumer: Consumer<Option<T>>,
    registry: &Observer<Option<T>>,
) {
    registry.add_weak_consumer(&consumer);
    if let Some(record) = lock(&owner.links).iter_mut().find(|record| record.id == id) {
        record.inbound = Some(consumer);
    }
}

/// Undo what `attach` registered on `registry` for `record`.
fn release<T: ValueType>(record: LinkRecord<T>, registry: &Observer<Option<T>>) {
    if let Some(consumer) = record.inbound {
        registry.remove_weak_consumer(&consumer);
    }
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

/// Marks a link as mid-propagation for as long as it lives.
struct Syncing<'a>(&'a AtomicBool);

impl<'a> Syncing<'a> {
    /// `None` if the link is already propagating.
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then_some(Self(flag))
    }
}

impl Drop for Syncing<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A consumer forwarding values to `target`, suppressed while the shared
/// `syncing` flag is up.
fn propagate<T: ValueType>(target: &Arc<ValueInner<T>>, syncing: &Arc<AtomicBool>) -> Consumer<Option<T>> {
    let target = Arc::downgrade(target);
    let syncing = Arc::clone(syncing);
    Arc::new(move |value: &Option<T>| {
        let Some(_syncing) = Syncing::enter(&syncing) else {
            return;
        };
        forward(&target, value);
    })
}

/// A consumer applying every upstream value to `target`.
fn follow<T: ValueType>(target: &Arc<ValueInner<T>>) -> Consumer<Option<T>> {
    let target = Arc::downgrade(target);
    Arc::new(move |value: &Option<T>| forward(&target, value))
}

fn forward<T: ValueType>(target: &Weak<ValueInner<T>>, value: &Option<T>) {
    if let Some(target) = target.upgrade() {
        // The sender's chain ran this cell's checks before committing.
        let _ = target.set(value.clone());
    }
}

// ---------------------------------------------------------------------------
// Public surface
// ---------------------------------------------------------------------------

impl<T: ValueType> Value<T> {
    /// Link this cell to `original`, keeping both in sync in both directions.
    ///
    /// This cell first adopts `original`'s current value. From then on a
    /// `set` on either side is validated against both chains, committed on
    /// both, and notified once on each.
    ///
    /// # Errors
    ///
    /// - [`LinkError::SelfLink`], [`LinkError::AlreadyLinked`],
    ///   [`LinkError::Cycle`] as described in the module docs;
    /// - this cell's rejection of `original`'s value, in which case no link
    ///   is made.
    pub fn link(&self, original: &Value<T>) -> Result<(), ValueError> {
        let linked = self.inner();
        let original = original.inner();
        let id = reserve(linked, original, Role::Linked, Role::Original)?;
        if let Err(err) = linked.set(original.get()) {
            rollback(linked, original, id);
            return Err(err);
        }
        {
            let _graph = lock(&GRAPH);
            linked.push_validator(ChainEntry::Link {
                origin: id,
                partner: Arc::downgrade(original),
            });
            original.push_validator(ChainEntry::Link {
                origin: id,
                partner: Arc::downgrade(linked),
            });
        }
        let syncing = Arc::new(AtomicBool::new(false));
        attach(
            original,
            id,
            propagate(original, &syncing),
            &linked.event().observer(),
        );
        attach(
            linked,
            id,
            propagate(linked, &syncing),
            &original.event().observer(),
        );
        tracing::debug!(linked = ?linked.id, original = ?original.id, link = ?id, "values linked");
        Ok(())
    }

    /// Remove the link between this cell and `other`, made from either side.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotLinked`] if there is no such link.
    pub fn unlink(&self, other: &Value<T>) -> Result<(), ValueError> {
        let this = self.inner();
        let other = other.inner();
        let (id, mine, theirs) = {
            let _graph = lock(&GRAPH);
            let id = lock(&this.links)
                .iter()
                .find(|record| record.partner_id == other.id && record.role.is_bidirectional())
                .map(|record| record.id)
                .ok_or(LinkError::NotLinked)?;
            (id, detach(this, id), detach(other, id))
        };
        this.remove_link_validators(id);
        other.remove_link_validators(id);
        if let Some(record) = mine {
            release(record, &other.event().observer());
        }
        if let Some(record) = theirs {
            release(record, &this.event().observer());
        }
        tracing::debug!(cell = ?this.id, partner = ?other.id, link = ?id, "values unlinked");
        Ok(())
    }

    /// Make this cell follow `source`: adopt its current value now and every
    /// value it notifies from then on.
    ///
    /// Updates flow one way only; this cell stays freely settable. The
    /// source's `set` fails for any value this cell would refuse.
    ///
    /// # Errors
    ///
    /// - [`LinkError::SelfLink`] for this cell's own observable;
    /// - [`LinkError::Detached`] if `source`'s cell is gone;
    /// - [`LinkError::AlreadyLinked`], [`LinkError::Cycle`];
    /// - this cell's rejection of the current upstream value.
    pub fn link_observable(&self, source: &Observable<T>) -> Result<(), ValueError> {
        let follower = self.inner();
        if source.owner_id() == follower.id {
            return Err(LinkError::SelfLink.into());
        }
        let owner = source.owner().ok_or(LinkError::Detached)?;
        let id = reserve(follower, &owner, Role::Follower, Role::Source)?;
        if let Err(err) = follower.set(owner.get()) {
            rollback(follower, &owner, id);
            return Err(err);
        }
        {
            let _graph = lock(&GRAPH);
            owner.push_validator(ChainEntry::Link {
                origin: id,
                partner: Arc::downgrade(follower),
            });
        }
        attach(follower, id, follow(follower), &source.observer());
        tracing::debug!(follower = ?follower.id, source = ?owner.id, link = ?id, "observable linked");
        Ok(())
    }

    /// Stop following `source`.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotLinked`] if this cell does not follow `source`.
    pub fn unlink_observable(&self, source: &Observable<T>) -> Result<(), ValueError> {
        let follower = self.inner();
        let (id, record) = {
            let _graph = lock(&GRAPH);
            let id = lock(&follower.links)
                .iter()
                .find(|record| record.partner_id == source.owner_id() && record.role == Role::Follower)
                .map(|record| record.id)
                .ok_or(LinkError::NotLinked)?;
            if let Some(owner) = source.owner() {
                detach(&owner, id);
                owner.remove_link_validators(id);
            }
            (id, detach(follower, id))
        };
        if let Some(record) = record {
            release(record, &source.observer());
        }
        tracing::debug!(follower = ?follower.id, link = ?id, "observable unlinked");
        Ok(())
    }

    /// Whether this cell and `other` are linked, from either side.
    #[must_use]
    pub fn is_linked(&self, other: &Value<T>) -> bool {
        let other_id = other.inner().id;
        lock(&self.inner().links)
            .iter()
            .any(|record| record.partner_id == other_id && record.is_alive() && record.role.is_bidirectional())
    }

    /// Whether this cell follows `source`.
    #[must_use]
    pub fn is_following(&self, source: &Observable<T>) -> bool {
        lock(&self.inner().links)
            .iter()
            .any(|record| record.partner_id == source.owner_id() && record.role == Role::Follower)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Listener;
    use crate::validator::Validator;
    use std::sync::atomic::AtomicUsize;

    fn counter<T: ValueType>(value: &Value<T>) -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let listener: Listener = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        value.observer().add_listener(&listener);
        (count, listener)
    }

    fn at_most(max: i32) -> Validator<i32> {
        Validator::predicate(format!("at most {max}"), move |v: Option<&i32>| {
            v.is_none_or(|v| *v <= max)
        })
    }

    #[test]
    fn link_seeds_and_propagates_both_ways() {
        let model = Value::nullable_with(42);
        let ui: Value<i32> = Value::nullable();
        ui.link(&model).unwrap();
        assert_eq!(ui.get(), Some(42));
        assert_eq!(ui.link(&model), Err(ValueError::Link(LinkError::AlreadyLinked)));
        assert_eq!(model.link(&ui), Err(ValueError::Link(LinkError::AlreadyLinked)));

        let (model_count, _m) = counter(&model);
        let (ui_count, _u) = counter(&ui);

        ui.set(20).unwrap();
        assert_eq!(model.get(), Some(20));
        assert_eq!(model_count.load(Ordering::SeqCst), 1);
        assert_eq!(ui_count.load(Ordering::SeqCst), 1);

        model.set(22).unwrap();
        assert_eq!(ui.get(), Some(22));
        assert_eq!(model_count.load(Ordering::SeqCst), 2);
        assert_eq!(ui_count.load(Ordering::SeqCst), 2);

        ui.set(22).unwrap();
        assert_eq!(model_count.load(Ordering::SeqCst), 2);
        assert_eq!(ui_count.load(Ordering::SeqCst), 2);

        ui.clear().unwrap();
        assert!(model.is_null());
        assert!(ui.is_null());
        assert_eq!(model_count.load(Ordering::SeqCst), 3);
        assert_eq!(ui_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn self_link_is_rejected() {
        let value: Value<i32> = Value::nullable();
        assert_eq!(value.link(&value), Err(ValueError::Link(LinkError::SelfLink)));
        assert_eq!(
            value.link(&value.clone()),
            Err(ValueError::Link(LinkError::SelfLink))
        );
        assert_eq!(
            value.link_observable(&value.observable()),
            Err(ValueError::Link(LinkError::SelfLink))
        );
    }

    #[test]
    fn chained_links_propagate_and_validate_end_to_end() {
        let value1: Value<i32> = Value::nullable();
        let value2: Value<i32> = Value::nullable();
        let value3: Value<i32> = Value::nullable();
        value3.add_validator(at_most(4)).unwrap();
        let value4: Value<i32> = Value::nullable();

        value1.link(&value2).unwrap();
        value2.link(&value3).unwrap();
        value3.link(&value4).unwrap();

        value1.set(1).unwrap();
        for value in [&value2, &value3, &value4] {
            assert_eq!(value.get(), Some(1));
        }

        value4.set(2).unwrap();
        for value in [&value1, &value2, &value3] {
            assert_eq!(value.get(), Some(2));
        }

        assert_eq!(value4.link(&value1), Err(ValueError::Link(LinkError::Cycle)));

        value3.set(3).unwrap();
        for value in [&value1, &value2, &value4] {
            assert_eq!(value.get(), Some(3));
        }

        for value in [&value1, &value2, &value3, &value4] {
            assert!(matches!(value.set(5), Err(ValueError::Invalid(_))));
        }
        for value in [&value1, &value2, &value3, &value4] {
            assert_eq!(value.get(), Some(3));
        }
    }

    #[test]
    fn each_cell_in_a_chain_is_notified_once() {
        let cells: Vec<Value<i32>> = (0..4).map(|_| Value::non_null(0)).collect();
        for pair in cells.windows(2) {
            pair[1].link(&pair[0]).unwrap();
        }
        let counters: Vec<_> = cells.iter().map(counter).collect();

        cells[2].set(7).unwrap();
        for (count, _) in &counters {
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn cycle_through_three_cells_is_rejected() {
        let a = Value::non_null(0);
        let b = Value::non_null(0);
        let c = Value::non_null(0);
        a.link(&b).unwrap();
        b.link(&c).unwrap();
        assert_eq!(c.link(&a), Err(ValueError::Link(LinkError::Cycle)));
        // The refused link left nothing behind.
        assert!(!c.is_linked(&a));
        assert_eq!(c.unlink(&a), Err(ValueError::Link(LinkError::NotLinked)));
    }

    #[test]
    fn unlink_stops_propagation_and_cross_validation() {
        let value = Value::non_null(0);
        value.add_validator(at_most(2)).unwrap();
        let original = Value::nullable_with(1);

        value.link(&original).unwrap();
        assert_eq!(value.get(), Some(1));
        assert!(value.is_linked(&original));
        assert!(original.is_linked(&value));
        assert!(matches!(original.set(3), Err(ValueError::Invalid(_))));
        assert_eq!(original.get(), Some(1));

        value.unlink(&original).unwrap();
        assert!(!value.is_linked(&original));
        original.set(3).unwrap();
        assert_eq!(value.get(), Some(1));
        assert_eq!(
            value.unlink(&original),
            Err(ValueError::Link(LinkError::NotLinked))
        );
    }

    #[test]
    fn unlink_from_the_original_side() {
        let a = Value::non_null(0);
        let b = Value::non_null(0);
        a.link(&b).unwrap();
        b.unlink(&a).unwrap();
        a.set(9).unwrap();
        assert_eq!(b.get(), Some(0));
        // The pair may be linked again afterwards.
        b.link(&a).unwrap();
        assert_eq!(b.get(), Some(9));
    }

    #[test]
    fn rejected_seed_leaves_no_link() {
        let value = Value::non_null(0);
        value.add_validator(at_most(2)).unwrap();
        let original = Value::nullable_with(5);

        assert!(matches!(value.link(&original), Err(ValueError::Invalid(_))));
        assert!(!value.is_linked(&original));
        original.set(7).unwrap();
        assert_eq!(value.get(), Some(0));
    }

    #[test]
    fn observable_link_is_one_way() {
        let model = Value::non_null(0);
        model.set(42).unwrap();
        let ui: Value<i32> = Value::nullable();
        ui.link_observable(&model.observable()).unwrap();
        assert!(ui.is_following(&model.observable()));

        let (model_count, _m) = counter(&model);
        let (ui_count, _u) = counter(&ui);
        assert_eq!(ui.get(), Some(42));

        ui.set(20).unwrap();
        assert_eq!(model.get(), Some(42));
        assert_eq!(model_count.load(Ordering::SeqCst), 0);
        assert_eq!(ui_count.load(Ordering::SeqCst), 1);

        model.set(22).unwrap();
        assert_eq!(ui.get(), Some(22));
        assert_eq!(model_count.load(Ordering::SeqCst), 1);
        assert_eq!(ui_count.load(Ordering::SeqCst), 2);

        ui.clear().unwrap();
        assert_eq!(model.get(), Some(22));
        assert!(ui.is_null());
    }

    #[test]
    fn observable_link_and_unlink() {
        let value = Value::non_null(0);
        value.add_validator(at_most(2)).unwrap();
        let original = Value::nullable_with(3);
        let observable = original.observable();

        assert!(matches!(
            value.link_observable(&observable),
            Err(ValueError::Invalid(_))
        ));

        original.set(2).unwrap();
        value.link_observable(&observable).unwrap();
        assert_eq!(value.get(), Some(2));
        assert_eq!(
            value.link_observable(&observable),
            Err(ValueError::Link(LinkError::AlreadyLinked))
        );

        // The follower's validator guards the source too.
        assert!(matches!(original.set(3), Err(ValueError::Invalid(_))));
        assert_eq!(original.get(), Some(2));
        assert_eq!(value.get(), Some(2));

        value.unlink_observable(&observable).unwrap();
        assert_eq!(
            value.unlink_observable(&observable),
            Err(ValueError::Link(LinkError::NotLinked))
        );
        original.set(3).unwrap();
        assert_eq!(value.get(), Some(2));
    }

    #[test]
    fn locked_follower_refuses_source_changes() {
        let source = Value::non_null(1);
        let follower = Value::non_null(0);
        follower.link_observable(&source.observable()).unwrap();
        follower.set_locked(true);

        assert_eq!(source.set(2), Err(ValueError::Locked));
        assert_eq!(source.get(), Some(1));
        source.set(1).unwrap();

        follower.set_locked(false);
        source.set(2).unwrap();
        assert_eq!(follower.get(), Some(2));
    }

    #[test]
    fn source_checks_reach_through_a_followers_links() {
        let source = Value::non_null(0);
        let follower = Value::non_null(0);
        let partner = Value::non_null(0);
        partner.add_validator(at_most(3)).unwrap();
        follower.link(&partner).unwrap();
        follower.link_observable(&source.observable()).unwrap();

        assert!(matches!(source.set(4), Err(ValueError::Invalid(_))));
        for value in [&source, &follower, &partner] {
            assert_eq!(value.get(), Some(0));
        }
        source.set(3).unwrap();
        assert_eq!(partner.get(), Some(3));
    }

    #[test]
    fn dropped_partners_are_pruned() {
        let model = Value::non_null(0);
        for _ in 0..100 {
            let field = Value::non_null(0);
            field.link(&model).unwrap();
        }
        assert_eq!(model.observer().len(), 0);

        model.set(1).unwrap();
        assert!(lock(&model.inner().links).is_empty());
        assert_eq!(model.inner().chain_len(), 0);

        let field = Value::non_null(0);
        field.link(&model).unwrap();
        assert_eq!(model.observer().len(), 1);
        assert_eq!(lock(&model.inner().links).len(), 1);
        assert_eq!(model.inner().chain_len(), 1);
    }

    #[test]
    fn dropped_followers_are_pruned() {
        let source = Value::non_null(0);
        for _ in 0..100 {
            let follower = Value::non_null(0);
            follower.link_observable(&source.observable()).unwrap();
        }
        assert_eq!(source.observer().len(), 0);

        // Linking prunes as well as committing does.
        let follower = Value::non_null(0);
        follower.link_observable(&source.observable()).unwrap();
        assert_eq!(lock(&source.inner().links).len(), 1);
        assert_eq!(source.inner().chain_len(), 1);
        source.set(5).unwrap();
        assert_eq!(follower.get(), Some(5));
    }

    #[test]
    fn dropped_source_is_pruned_from_follower() {
        let follower = Value::non_null(0);
        {
            let source = Value::non_null(1);
            follower.link_observable(&source.observable()).unwrap();
        }
        follower.set(2).unwrap();
        assert!(lock(&follower.inner().links).is_empty());
    }

    #[test]
    fn concurrent_links_to_one_model() {
        let model = Value::non_null(0u32);
        let fields: Vec<Value<u32>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..50)
                            .map(|_| {
                                let field = Value::non_null(0);
                                field.link(&model).unwrap();
                                field
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap())
                .collect()
        });

        assert_eq!(fields.len(), 400);
        assert_eq!(model.observer().len(), 400);
        model.set(7).unwrap();
        assert!(fields.iter().all(|field| field.get() == Some(7)));
        // Closing any loop through the shared model is refused.
        assert_eq!(
            fields[0].link(&fields[399]),
            Err(ValueError::Link(LinkError::Cycle))
        );
    }

    #[test]
    fn observable_of_dropped_value_is_detached() {
        let original = Value::nullable_with(1);
        let observable = original.observable();
        drop(original);
        let value: Value<i32> = Value::nullable();
        assert_eq!(
            value.link_observable(&observable),
            Err(ValueError::Link(LinkError::Detached))
        );
    }

    #[test]
    fn dropped_partner_stops_constraining() {
        let a = Value::non_null(0);
        {
            let b = Value::non_null(0);
            b.add_validator(at_most(1)).unwrap();
            a.link(&b).unwrap();
            assert!(a.set(2).is_err());
        }
        a.set(2).unwrap();
        assert_eq!(a.get(), Some(2));
    }

    #[test]
    fn link_does_not_keep_partner_alive() {
        let a = Value::non_null(0);
        let b = Value::non_null(0);
        a.link(&b).unwrap();
        let weak = b.downgrade();
        drop(b);
        assert!(weak.upgrade().is_none());
    }
}
