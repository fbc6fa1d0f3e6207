use crate::models::{AgentId, Resource};
use crate::{Error, Map, Result};

/// A named channel on which requests and bids are matched.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Commodity(String);

impl Commodity {
    /// The commodity name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Commodity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Commodity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Commodity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Stable handle to a request within one exchange round.
///
/// Indexes into the round's collected request portfolios; meaningless across
/// rounds, since the graph is rebuilt from scratch every time step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId {
    /// Index of the owning portfolio in the round's collection.
    pub portfolio: u32,
    /// Index of the request within its portfolio.
    pub index: u32,
}

/// Stable handle to a bid within one exchange round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BidId {
    /// Index of the owning portfolio in the round's collection.
    pub portfolio: u32,
    /// Index of the bid within its portfolio.
    pub index: u32,
}

/// A trader's want: a target resource on a commodity, with a preference.
#[derive(Clone, Debug)]
pub struct Request {
    /// The commodity channel.
    pub commodity: Commodity,
    /// What is wanted; quantity and (for materials) composition or (for
    /// products) quality.
    pub target: Resource,
    /// Finite weight biasing matching; higher is better, default zero.
    pub preference: f64,
    /// When set, the request is all-or-nothing.
    pub exclusive: bool,
}

impl Request {
    /// A non-exclusive, zero-preference request.
    pub fn new(commodity: impl Into<Commodity>, target: Resource) -> Self {
        Self {
            commodity: commodity.into(),
            target,
            preference: 0.0,
            exclusive: false,
        }
    }

    /// Set the preference.
    pub fn with_preference(mut self, preference: f64) -> Self {
        self.preference = preference;
        self
    }

    /// Mark the request all-or-nothing.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// A linear capacity constraint `sum(coeff_i * qty_i) <= capacity` over the
/// chosen quantities of a portfolio's entries.
#[derive(Clone, Debug)]
pub struct CapacityConstraint {
    capacity: f64,
    coeffs: Option<Vec<f64>>,
}

impl CapacityConstraint {
    /// A unit-coefficient constraint: total matched quantity at most
    /// `capacity`.
    pub fn new(capacity: f64) -> Result<Self> {
        if !capacity.is_finite() || capacity < 0.0 {
            return Err(Error::Value(format!(
                "invalid constraint capacity {capacity}"
            )));
        }
        Ok(Self {
            capacity,
            coeffs: None,
        })
    }

    /// A constraint with one coefficient per portfolio entry, in entry order.
    pub fn with_coeffs(capacity: f64, coeffs: Vec<f64>) -> Result<Self> {
        let mut cc = Self::new(capacity)?;
        if coeffs.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(Error::Value("constraint coefficients must be finite and non-negative".to_string()));
        }
        cc.coeffs = Some(coeffs);
        Ok(cc)
    }

    /// The constraint capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// The coefficient applied to entry `index` (1.0 unless specified).
    pub fn coeff(&self, index: usize) -> f64 {
        match &self.coeffs {
            Some(coeffs) => coeffs.get(index).copied().unwrap_or(1.0),
            None => 1.0,
        }
    }
}

/// A trader's bundle of requests for one round, with its capacity
/// constraints and mutual-request groups.
#[derive(Clone, Debug)]
pub struct RequestPortfolio {
    requester: AgentId,
    requests: Vec<Request>,
    constraints: Vec<CapacityConstraint>,
    mutual: Vec<Vec<usize>>,
}

impl RequestPortfolio {
    /// An empty portfolio owned by `requester`.
    pub fn new(requester: AgentId) -> Self {
        Self {
            requester,
            requests: Vec::new(),
            constraints: Vec::new(),
            mutual: Vec::new(),
        }
    }

    /// Append a request, returning its index within the portfolio.
    ///
    /// The target quantity must be positive and the preference finite.
    pub fn add_request(&mut self, request: Request) -> Result<usize> {
        if request.target.quantity() <= 0.0 {
            return Err(Error::Value(
                "request target quantity must be positive".to_string(),
            ));
        }
        if !request.preference.is_finite() {
            return Err(Error::Value("request preference must be finite".to_string()));
        }
        self.requests.push(request);
        Ok(self.requests.len() - 1)
    }

    /// Attach a capacity constraint over this portfolio's requests.
    pub fn add_constraint(&mut self, constraint: CapacityConstraint) {
        self.constraints.push(constraint);
    }

    /// Declare a mutual-request group: the named requests are satisfied
    /// all-or-nothing.
    pub fn add_mutual_group(&mut self, members: &[usize]) -> Result<()> {
        if members.iter().any(|&i| i >= self.requests.len()) {
            return Err(Error::Key("mutual group references unknown request".to_string()));
        }
        if members.len() > 1 {
            self.mutual.push(members.to_vec());
        }
        Ok(())
    }

    /// The owning trader.
    pub fn requester(&self) -> AgentId {
        self.requester
    }

    /// The requests, in insertion order.
    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    /// The portfolio's capacity constraints.
    pub fn constraints(&self) -> &[CapacityConstraint] {
        &self.constraints
    }

    /// The mutual-request groups, as request indices.
    pub fn mutual_groups(&self) -> &[Vec<usize>] {
        &self.mutual
    }

    /// True when the portfolio holds no requests.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// An offer of a concrete resource against a specific request.
#[derive(Clone, Debug)]
pub struct Bid {
    /// The request this bid answers.
    pub request: RequestId,
    /// The offered resource.
    pub offer: Resource,
    /// When set, the offer trades in full or not at all.
    pub exclusive: bool,
}

impl Bid {
    /// A non-exclusive bid.
    pub fn new(request: RequestId, offer: Resource) -> Self {
        Self {
            request,
            offer,
            exclusive: false,
        }
    }

    /// Mark the bid all-or-nothing.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }
}

/// A trader's bundle of bids for one round, with capacity constraints.
#[derive(Clone, Debug)]
pub struct BidPortfolio {
    bidder: AgentId,
    bids: Vec<Bid>,
    constraints: Vec<CapacityConstraint>,
}

impl BidPortfolio {
    /// An empty portfolio owned by `bidder`.
    pub fn new(bidder: AgentId) -> Self {
        Self {
            bidder,
            bids: Vec::new(),
            constraints: Vec::new(),
        }
    }

    /// Append a bid, returning its index within the portfolio.
    pub fn add_bid(&mut self, bid: Bid) -> Result<usize> {
        if bid.offer.quantity() <= 0.0 {
            return Err(Error::Value("bid offer quantity must be positive".to_string()));
        }
        self.bids.push(bid);
        Ok(self.bids.len() - 1)
    }

    /// Attach a capacity constraint over this portfolio's bids.
    pub fn add_constraint(&mut self, constraint: CapacityConstraint) {
        self.constraints.push(constraint);
    }

    /// The owning trader.
    pub fn bidder(&self) -> AgentId {
        self.bidder
    }

    /// The bids, in insertion order.
    pub fn bids(&self) -> &[Bid] {
        &self.bids
    }

    /// The portfolio's capacity constraints.
    pub fn constraints(&self) -> &[CapacityConstraint] {
        &self.constraints
    }

    /// True when the portfolio holds no bids.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }
}

/// A matched `(request, bid, quantity)` triple produced by the solver.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trade {
    /// The matched request.
    pub request: RequestId,
    /// The matched bid.
    pub bid: BidId,
    /// Matched quantity: positive, at most the request target and the bid
    /// offer.
    pub qty: f64,
}

/// The bidder-facing view of one round's collected requests, grouped by
/// commodity.
pub struct RequestBook<'a> {
    portfolios: &'a [RequestPortfolio],
    by_commod: Map<Commodity, Vec<RequestId>>,
}

impl<'a> RequestBook<'a> {
    /// Index the given portfolios by commodity, preserving insertion order.
    pub fn new(portfolios: &'a [RequestPortfolio]) -> Self {
        let mut by_commod: Map<Commodity, Vec<RequestId>> = Map::default();
        for (p, portfolio) in portfolios.iter().enumerate() {
            for (i, request) in portfolio.requests().iter().enumerate() {
                by_commod
                    .entry(request.commodity.clone())
                    .or_default()
                    .push(RequestId {
                        portfolio: p as u32,
                        index: i as u32,
                    });
            }
        }
        Self {
            portfolios,
            by_commod,
        }
    }

    /// The commodities with at least one open request.
    pub fn commodities(&self) -> impl Iterator<Item = &Commodity> {
        self.by_commod.keys()
    }

    /// The requests on one commodity, in collection order.
    pub fn requests_for<'s>(
        &'s self,
        commodity: &Commodity,
    ) -> impl Iterator<Item = (RequestId, &'a Request)> + 's {
        self.by_commod
            .get(commodity)
            .into_iter()
            .flatten()
            .filter_map(|&id| Some((id, self.get(id)?)))
    }

    /// Resolve a request handle.
    pub fn get(&self, id: RequestId) -> Option<&'a Request> {
        self.portfolios
            .get(id.portfolio as usize)?
            .requests()
            .get(id.index as usize)
    }

    /// The trader owning a request.
    pub fn requester(&self, id: RequestId) -> Option<AgentId> {
        Some(self.portfolios.get(id.portfolio as usize)?.requester())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Material, Composition, ResourceIds};
    use std::sync::Arc;

    fn target(ids: &mut ResourceIds, qty: f64) -> Resource {
        let comp = Arc::new(Composition::from_mass([(92235, 1.0)]).unwrap());
        Resource::Material(Material::new(ids, qty, comp).unwrap())
    }

    #[test]
    fn portfolio_validates_requests() {
        let mut ids = ResourceIds::new();
        let mut port = RequestPortfolio::new(AgentId(1));
        assert!(port
            .add_request(Request::new("c", target(&mut ids, 0.0)))
            .is_err());
        assert!(port
            .add_request(Request::new("c", target(&mut ids, 1.0)).with_preference(f64::INFINITY))
            .is_err());
        let idx = port
            .add_request(Request::new("c", target(&mut ids, 1.0)))
            .unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn mutual_group_bounds_checked() {
        let mut ids = ResourceIds::new();
        let mut port = RequestPortfolio::new(AgentId(1));
        let a = port
            .add_request(Request::new("c", target(&mut ids, 1.0)))
            .unwrap();
        let b = port
            .add_request(Request::new("c", target(&mut ids, 1.0)))
            .unwrap();
        port.add_mutual_group(&[a, b]).unwrap();
        assert!(port.add_mutual_group(&[0, 5]).is_err());
        assert_eq!(port.mutual_groups().len(), 1);
    }

    #[test]
    fn book_groups_by_commodity_in_order() {
        let mut ids = ResourceIds::new();
        let mut p1 = RequestPortfolio::new(AgentId(1));
        p1.add_request(Request::new("fuel", target(&mut ids, 1.0)))
            .unwrap();
        let mut p2 = RequestPortfolio::new(AgentId(2));
        p2.add_request(Request::new("waste", target(&mut ids, 2.0)))
            .unwrap();
        p2.add_request(Request::new("fuel", target(&mut ids, 3.0)))
            .unwrap();

        let portfolios = vec![p1, p2];
        let book = RequestBook::new(&portfolios);
        let fuel: Vec<_> = book.requests_for(&"fuel".into()).collect();
        assert_eq!(fuel.len(), 2);
        assert_eq!(fuel[0].0, RequestId { portfolio: 0, index: 0 });
        assert_eq!(fuel[1].0, RequestId { portfolio: 1, index: 1 });
        assert_eq!(book.requester(fuel[1].0), Some(AgentId(2)));
        assert!(book.requests_for(&"missing".into()).next().is_none());
    }

    #[test]
    fn constraint_coefficients_default_to_unit() {
        let cc = CapacityConstraint::new(5.0).unwrap();
        assert_eq!(cc.coeff(3), 1.0);
        let cc = CapacityConstraint::with_coeffs(5.0, vec![0.5, 2.0]).unwrap();
        assert_eq!(cc.coeff(0), 0.5);
        assert_eq!(cc.coeff(1), 2.0);
        assert_eq!(cc.coeff(9), 1.0);
        assert!(CapacityConstraint::new(f64::NAN).is_err());
    }
}
