use crate::errors::{HprofError, ParseResult};
use crate::IdSize;
use std::marker;

/// Lazily parses `count` same-typed entries out of a byte run.
///
/// Several record kinds carry runs of repeated entries (stack frame ids,
/// static fields, field descriptors, constant pool entries); this wraps the
/// shared count-down-and-reparse loop. The first error ends the iteration.
pub(crate) struct ParsingIterator<'a, T, P: EntryParser<T>> {
    parser: P,
    num_remaining: u32,
    remaining: &'a [u8],
    phantom: marker::PhantomData<T>,
}

impl<'a, S: IdSizedParse> ParsingIterator<'a, S, WithIdSize<S>> {
    pub(crate) fn with_id_size(
        id_size: IdSize,
        remaining: &'a [u8],
        num_remaining: u32,
    ) -> ParsingIterator<'a, S, WithIdSize<S>> {
        ParsingIterator {
            parser: WithIdSize::new(id_size),
            num_remaining,
            remaining,
            phantom: marker::PhantomData,
        }
    }
}

impl<'a, S: StatelessParse> ParsingIterator<'a, S, Stateless<S>> {
    pub(crate) fn stateless(
        remaining: &'a [u8],
        num_remaining: u32,
    ) -> ParsingIterator<'a, S, Stateless<S>> {
        ParsingIterator {
            parser: Stateless::new(),
            num_remaining,
            remaining,
            phantom: marker::PhantomData,
        }
    }
}

impl<'a, T, P: EntryParser<T>> Iterator for ParsingIterator<'a, T, P> {
    type Item = Result<T, HprofError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_remaining == 0 {
            debug_assert_eq!(0, self.remaining.len());
            return None;
        }

        match self.parser.parse(self.remaining) {
            Ok((input, val)) => {
                self.remaining = input;
                self.num_remaining -= 1;
                Some(Ok(val))
            }
            Err(e) => {
                self.num_remaining = 0;
                self.remaining = &[];
                Some(Err(e))
            }
        }
    }
}

/// A parser that needs carried state (the identifier width, so far). Used
/// with [`ParsingIterator`] for the iterate-and-parse pattern.
pub(crate) trait EntryParser<T>: Sized {
    fn parse<'a>(&self, input: &'a [u8]) -> ParseResult<'a, T>;
}

/// Entry types whose encoding does not depend on the identifier width.
pub(crate) trait StatelessParse: Sized {
    fn parse(input: &[u8]) -> ParseResult<'_, Self>;
}

/// Entry types whose encoding embeds ids at the dump's identifier width.
pub(crate) trait IdSizedParse: Sized {
    fn parse(input: &[u8], id_size: IdSize) -> ParseResult<'_, Self>;
}

/// Adapts an [`IdSizedParse`] into an [`EntryParser`].
pub(crate) struct WithIdSize<P: IdSizedParse> {
    id_size: IdSize,
    phantom: marker::PhantomData<P>,
}

impl<P: IdSizedParse> WithIdSize<P> {
    fn new(id_size: IdSize) -> WithIdSize<P> {
        WithIdSize {
            id_size,
            phantom: marker::PhantomData,
        }
    }
}

impl<P: IdSizedParse> EntryParser<P> for WithIdSize<P> {
    fn parse<'a>(&self, input: &'a [u8]) -> ParseResult<'a, P> {
        P::parse(input, self.id_size)
    }
}

/// Adapts a [`StatelessParse`] into an [`EntryParser`].
pub(crate) struct Stateless<P: StatelessParse> {
    phantom: marker::PhantomData<P>,
}

impl<P: StatelessParse> Stateless<P> {
    fn new() -> Stateless<P> {
        Stateless {
            phantom: marker::PhantomData,
        }
    }
}

impl<P: StatelessParse> EntryParser<P> for Stateless<P> {
    fn parse<'a>(&self, input: &'a [u8]) -> ParseResult<'a, P> {
        P::parse(input)
    }
}
