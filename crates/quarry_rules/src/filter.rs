//! Filters: validated, ordered term lists with field assignments.

use quarry_foundation::{Error, ErrorKind, Result};

use crate::term::{Oper, Predicate, Term, TermId};

/// An ordered list of terms ready for compilation.
///
/// Every term owns one field, except that all terms of an `Or` chain share the
/// field of the chain's first term. Fields are numbered from zero.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    terms: Vec<Term>,
    fields: Vec<usize>,
    field_count: usize,
}

impl Filter {
    /// Validates the terms and assigns fields.
    ///
    /// # Errors
    /// Returns `InvalidTerm` for malformed terms and `InvalidOperator` for operators
    /// that cannot be combined.
    pub fn new(terms: Vec<Term>) -> Result<Self> {
        let mut fields = Vec::with_capacity(terms.len());
        let mut field_count = 0;

        for (i, term) in terms.iter().enumerate() {
            validate_term(term).map_err(|e| e.at_term(i))?;

            let continues_chain = term.oper == Oper::Or && i > 0 && terms[i - 1].oper == Oper::Or;
            if continues_chain {
                if terms[i - 1].src != term.src {
                    return Err(Error::new(ErrorKind::InvalidOperator(
                        "terms of an or chain must share a source".to_string(),
                    ))
                    .at_term(i));
                }
                fields.push(field_count - 1);
            } else {
                fields.push(field_count);
                field_count += 1;
            }
        }

        Ok(Self {
            terms,
            fields,
            field_count,
        })
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder() -> FilterBuilder {
        FilterBuilder::default()
    }

    /// The terms, in order.
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Field index of a term.
    #[must_use]
    pub fn field_of(&self, term: usize) -> usize {
        self.fields[term]
    }

    /// Number of fields a match reports.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Returns true if the filter has no terms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

fn validate_term(term: &Term) -> Result<()> {
    if matches!(term.first, TermId::Name(_)) || matches!(term.src, TermId::Name(_)) {
        return Err(Error::invalid_term("literal names are only valid as predicate operands"));
    }
    let Some(pred) = term.predicate else {
        if matches!(term.second, Some(TermId::Name(_))) {
            return Err(Error::invalid_term("literal names are only valid as predicate operands"));
        }
        return Ok(());
    };

    if term.src.var_name().is_none() {
        return Err(Error::invalid_term("predicate left operand must be a variable"));
    }
    if matches!(term.oper, Oper::Or | Oper::Optional) {
        return Err(Error::new(ErrorKind::InvalidOperator(
            "predicates cannot be optional or part of an or chain".to_string(),
        )));
    }
    match (&term.second, pred.compares_names()) {
        (Some(TermId::Name(_)), true) | (Some(TermId::Entity(_) | TermId::Var(_)), false) => Ok(()),
        _ => Err(Error::invalid_term(match pred {
            Predicate::Eq | Predicate::Neq => "equality needs an entity or variable operand",
            _ => "name predicates need a literal name operand",
        })),
    }
}

/// Incremental construction of a [`Filter`].
#[derive(Clone, Debug, Default)]
pub struct FilterBuilder {
    terms: Vec<Term>,
}

impl FilterBuilder {
    /// Appends a term.
    #[must_use]
    pub fn term(mut self, term: Term) -> Self {
        self.terms.push(term);
        self
    }

    /// Validates and builds the filter.
    ///
    /// # Errors
    /// See [`Filter::new`].
    pub fn build(self) -> Result<Filter> {
        Filter::new(self.terms)
    }
}
