//! LALR(1) table construction.
//!
//! Builds the LR(0) automaton over kernel items, then computes LALR(1)
//! lookaheads by spontaneous generation and propagation. Reduce actions are
//! read off the LR(1) closure of each state's kernel, which also covers
//! empty productions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::grammar::{Grammar, ProductionId, RuleId, Symbol, TerminalId};
use crate::lexer::TerminalSet;

pub type StateId = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Shift(StateId),
    Reduce(ProductionId),
    Accept,
}

/// Action and goto tables for one start rule.
#[derive(Debug, Clone)]
pub struct ParseTable {
    actions: Vec<HashMap<TerminalId, Action>>,
    gotos: Vec<HashMap<RuleId, StateId>>,
    allowed: Vec<TerminalSet>,
    expected: Vec<Vec<String>>,
}

impl ParseTable {
    pub fn build(grammar: &Grammar, start: RuleId) -> ParseTable {
        Builder::new(grammar, start).build()
    }

    pub fn action(&self, state: StateId, terminal: TerminalId) -> Option<Action> {
        self.actions[state].get(&terminal).copied()
    }

    pub fn goto(&self, state: StateId, rule: RuleId) -> Option<StateId> {
        self.gotos[state].get(&rule).copied()
    }

    /// Terminals (excluding end of input) with an action in `state`.
    pub fn allowed(&self, state: StateId) -> &TerminalSet {
        &self.allowed[state]
    }

    /// Sorted names of the terminals acceptable in `state`, `$END` included.
    pub fn expected(&self, state: StateId) -> Vec<String> {
        self.expected[state].clone()
    }

    pub fn state_count(&self) -> usize {
        self.actions.len()
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Placeholder lookahead used to detect propagation.
const DUMMY: u32 = u32::MAX - 1;
const END: u32 = TerminalId::END.0;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Item {
    production: u32,
    dot: u32,
}

impl Item {
    fn advance(self) -> Item {
        Item {
            production: self.production,
            dot: self.dot + 1,
        }
    }
}

type Lookaheads = BTreeSet<u32>;

struct Builder<'g> {
    grammar: &'g Grammar,
    start: RuleId,
    /// Index of the augmented production `$start -> start`.
    augmented: u32,
    start_rhs: [Symbol; 1],
    nullable: Vec<bool>,
    first: Vec<Lookaheads>,
}

impl<'g> Builder<'g> {
    fn new(grammar: &'g Grammar, start: RuleId) -> Self {
        let mut builder = Self {
            grammar,
            start,
            augmented: grammar.productions().len() as u32,
            start_rhs: [Symbol::Rule(start)],
            nullable: vec![false; grammar.rules().len()],
            first: vec![Lookaheads::new(); grammar.rules().len()],
        };
        builder.compute_first_sets();
        builder
    }

    fn rhs(&self, production: u32) -> &[Symbol] {
        if production == self.augmented {
            &self.start_rhs
        } else {
            &self.grammar.productions()[production as usize].symbols
        }
    }

    fn next_symbol(&self, item: Item) -> Option<Symbol> {
        self.rhs(item.production).get(item.dot as usize).copied()
    }

    fn compute_first_sets(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for production in self.grammar.productions() {
                let origin = production.origin.index();

                let nullable = production.symbols.iter().all(|symbol| match symbol {
                    Symbol::Rule(rule) => self.nullable[rule.index()],
                    Symbol::Terminal(_) => false,
                });
                if nullable && !self.nullable[origin] {
                    self.nullable[origin] = true;
                    changed = true;
                }

                for symbol in &production.symbols {
                    match symbol {
                        Symbol::Terminal(terminal) => {
                            changed |= self.first[origin].insert(terminal.0);
                            break;
                        }
                        Symbol::Rule(rule) => {
                            let inherited = self.first[rule.index()].clone();
                            let before = self.first[origin].len();
                            self.first[origin].extend(inherited);
                            changed |= self.first[origin].len() != before;
                            if !self.nullable[rule.index()] {
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// FIRST(symbols · lookahead).
    fn first_of(&self, symbols: &[Symbol], lookahead: &Lookaheads) -> Lookaheads {
        let mut first = Lookaheads::new();
        for symbol in symbols {
            match symbol {
                Symbol::Terminal(terminal) => {
                    first.insert(terminal.0);
                    return first;
                }
                Symbol::Rule(rule) => {
                    first.extend(self.first[rule.index()].iter().copied());
                    if !self.nullable[rule.index()] {
                        return first;
                    }
                }
            }
        }
        first.extend(lookahead.iter().copied());
        first
    }

    fn closure0(&self, kernel: &[Item]) -> BTreeSet<Item> {
        let mut items: BTreeSet<Item> = kernel.iter().copied().collect();
        let mut pending: Vec<Item> = kernel.to_vec();
        while let Some(item) = pending.pop() {
            if let Some(Symbol::Rule(rule)) = self.next_symbol(item) {
                for production in &self.grammar.rule(rule).productions {
                    let new = Item {
                        production: production.0,
                        dot: 0,
                    };
                    if items.insert(new) {
                        pending.push(new);
                    }
                }
            }
        }
        items
    }

    fn closure1(&self, seed: Vec<(Item, Lookaheads)>) -> BTreeMap<Item, Lookaheads> {
        let mut items: BTreeMap<Item, Lookaheads> = BTreeMap::new();
        let mut pending = Vec::with_capacity(seed.len());
        for (item, lookahead) in seed {
            items.entry(item).or_default().extend(lookahead);
            pending.push(item);
        }

        while let Some(item) = pending.pop() {
            let Some(Symbol::Rule(rule)) = self.next_symbol(item) else {
                continue;
            };
            let rest = &self.rhs(item.production)[item.dot as usize + 1..];
            let lookahead = self.first_of(rest, &items[&item]);
            for production in &self.grammar.rule(rule).productions {
                let new = Item {
                    production: production.0,
                    dot: 0,
                };
                let entry = items.entry(new).or_default();
                let before = entry.len();
                entry.extend(lookahead.iter().copied());
                if entry.len() != before {
                    pending.push(new);
                }
            }
        }
        items
    }

    fn build(self) -> ParseTable {
        // LR(0) automaton.
        let initial = vec![Item {
            production: self.augmented,
            dot: 0,
        }];
        let mut kernels: Vec<Vec<Item>> = vec![initial.clone()];
        let mut index: HashMap<Vec<Item>, StateId> = HashMap::from([(initial, 0)]);
        let mut transitions: Vec<BTreeMap<Symbol, StateId>> = Vec::new();

        let mut state = 0;
        while state < kernels.len() {
            let mut moves: BTreeMap<Symbol, BTreeSet<Item>> = BTreeMap::new();
            for item in self.closure0(&kernels[state]) {
                if let Some(symbol) = self.next_symbol(item) {
                    moves.entry(symbol).or_default().insert(item.advance());
                }
            }

            let mut edges = BTreeMap::new();
            for (symbol, kernel) in moves {
                let kernel: Vec<Item> = kernel.into_iter().collect();
                let target = match index.get(&kernel) {
                    Some(target) => *target,
                    None => {
                        let target = kernels.len();
                        index.insert(kernel.clone(), target);
                        kernels.push(kernel);
                        target
                    }
                };
                edges.insert(symbol, target);
            }
            transitions.push(edges);
            state += 1;
        }

        let lookaheads = self.lookaheads(&kernels, &transitions);
        let table = self.tables(&kernels, &transitions, &lookaheads);
        debug!(
            start = %self.grammar.rule(self.start).name,
            states = table.state_count(),
            "built LALR(1) table"
        );
        table
    }

    fn lookaheads(
        &self,
        kernels: &[Vec<Item>],
        transitions: &[BTreeMap<Symbol, StateId>],
    ) -> Vec<BTreeMap<Item, Lookaheads>> {
        let mut lookaheads: Vec<BTreeMap<Item, Lookaheads>> = kernels
            .iter()
            .map(|kernel| kernel.iter().map(|item| (*item, Lookaheads::new())).collect())
            .collect();
        if let Some(first) = lookaheads[0].values_mut().next() {
            first.insert(END);
        }

        let mut propagates: Vec<((StateId, Item), (StateId, Item))> = Vec::new();
        for (state, kernel) in kernels.iter().enumerate() {
            for &kernel_item in kernel {
                let closure = self.closure1(vec![(kernel_item, Lookaheads::from([DUMMY]))]);
                for (item, item_lookaheads) in closure {
                    let Some(symbol) = self.next_symbol(item) else {
                        continue;
                    };
                    let Some(&target) = transitions[state].get(&symbol) else {
                        continue;
                    };
                    let advanced = item.advance();
                    for lookahead in item_lookaheads {
                        if lookahead == DUMMY {
                            propagates.push(((state, kernel_item), (target, advanced)));
                        } else if let Some(set) = lookaheads[target].get_mut(&advanced) {
                            set.insert(lookahead);
                        }
                    }
                }
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for ((from_state, from_item), (to_state, to_item)) in &propagates {
                let source = lookaheads[*from_state][from_item].clone();
                if let Some(target) = lookaheads[*to_state].get_mut(to_item) {
                    let before = target.len();
                    target.extend(source);
                    changed |= target.len() != before;
                }
            }
        }
        lookaheads
    }

    fn tables(
        &self,
        kernels: &[Vec<Item>],
        transitions: &[BTreeMap<Symbol, StateId>],
        lookaheads: &[BTreeMap<Item, Lookaheads>],
    ) -> ParseTable {
        let mut actions = Vec::with_capacity(kernels.len());
        let mut gotos = Vec::with_capacity(kernels.len());

        for (state, edges) in transitions.iter().enumerate() {
            let mut row: HashMap<TerminalId, Action> = HashMap::new();
            let mut goto_row = HashMap::new();
            for (symbol, target) in edges {
                match symbol {
                    Symbol::Terminal(terminal) => {
                        row.insert(*terminal, Action::Shift(*target));
                    }
                    Symbol::Rule(rule) => {
                        goto_row.insert(*rule, *target);
                    }
                }
            }

            let seed = lookaheads[state]
                .iter()
                .map(|(item, set)| (*item, set.clone()))
                .collect();
            for (item, item_lookaheads) in self.closure1(seed) {
                if self.next_symbol(item).is_some() {
                    continue;
                }
                if item.production == self.augmented {
                    row.insert(TerminalId::END, Action::Accept);
                    continue;
                }
                let production = ProductionId(item.production);
                for lookahead in item_lookaheads {
                    self.add_reduce(state, &mut row, TerminalId(lookahead), production);
                }
            }

            actions.push(row);
            gotos.push(goto_row);
        }

        let allowed = actions
            .iter()
            .map(|row| {
                let mut set = TerminalSet::with_capacity(self.grammar.terminals().len());
                for terminal in row.keys() {
                    set.insert(*terminal);
                }
                set
            })
            .collect();
        let expected = actions
            .iter()
            .map(|row| {
                let mut names: Vec<String> = row
                    .keys()
                    .map(|t| self.grammar.terminal_name(*t).to_string())
                    .collect();
                names.sort();
                names
            })
            .collect();

        ParseTable {
            actions,
            gotos,
            allowed,
            expected,
        }
    }

    fn add_reduce(
        &self,
        state: StateId,
        row: &mut HashMap<TerminalId, Action>,
        lookahead: TerminalId,
        production: ProductionId,
    ) {
        let lookahead_name = self.grammar.terminal_name(lookahead);
        match row.get(&lookahead).copied() {
            None => {
                row.insert(lookahead, Action::Reduce(production));
            }
            Some(Action::Shift(_)) => {
                debug!(
                    state,
                    lookahead = %lookahead_name,
                    rule = %self.rule_name(production),
                    "shift/reduce conflict resolved as shift"
                );
            }
            Some(Action::Reduce(existing)) if existing != production => {
                let keep = self.preferred(existing, production);
                let dropped = if keep == existing { production } else { existing };
                warn!(
                    state,
                    lookahead = %lookahead_name,
                    kept = %self.rule_name(keep),
                    dropped = %self.rule_name(dropped),
                    "reduce/reduce conflict"
                );
                row.insert(lookahead, Action::Reduce(keep));
            }
            Some(_) => {}
        }
    }

    /// Higher rule priority wins, then the production declared first.
    fn preferred(&self, a: ProductionId, b: ProductionId) -> ProductionId {
        let priority = |p: ProductionId| {
            self.grammar
                .rule(self.grammar.production(p).origin)
                .priority
        };
        match priority(a).cmp(&priority(b)) {
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Equal => a.min(b),
        }
    }

    fn rule_name(&self, production: ProductionId) -> &str {
        &self
            .grammar
            .rule(self.grammar.production(production).origin)
            .name
    }
}
