mod lifecycle;
mod negotiation;
