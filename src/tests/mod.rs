pub(crate) mod propagation;
