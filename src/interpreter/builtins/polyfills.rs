//! Guest-source polyfills, parsed and executed once at construction time.
//! Running them through the step engine exercises the same machinery as user
//! code; their AST is span-stripped so external stepping observers never see
//! polyfill frames.

pub(crate) const SOURCE: &str = r#"
(function() {
  var defineProp = function(obj, name, value) {
    Object.defineProperty(obj, name, {
      configurable: true, enumerable: false, writable: true, value: value
    });
  };

  defineProp(Object, 'defineProperties', function defineProperties(obj, props) {
    if (obj === null || typeof obj !== 'object') {
      throw new TypeError('Object.defineProperties called on non-object');
    }
    for (var key in props) {
      if (props.hasOwnProperty(key)) {
        Object.defineProperty(obj, key, props[key]);
      }
    }
    return obj;
  });

  var create_ = Object.create;
  defineProp(Object, 'create', function create(proto, props) {
    var obj = create_(proto);
    if (props !== undefined) {
      Object.defineProperties(obj, props);
    }
    return obj;
  });

  defineProp(Array.prototype, 'every', function every(callback, thisArg) {
    if (this === null || this === undefined) {
      throw new TypeError('Array.prototype.every called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var t = Object(this);
    var len = t.length >>> 0;
    for (var i = 0; i < len; i++) {
      if (i in t && !callback.call(thisArg, t[i], i, t)) {
        return false;
      }
    }
    return true;
  });

  defineProp(Array.prototype, 'some', function some(callback, thisArg) {
    if (this === null || this === undefined) {
      throw new TypeError('Array.prototype.some called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var t = Object(this);
    var len = t.length >>> 0;
    for (var i = 0; i < len; i++) {
      if (i in t && callback.call(thisArg, t[i], i, t)) {
        return true;
      }
    }
    return false;
  });

  defineProp(Array.prototype, 'forEach', function forEach(callback, thisArg) {
    if (this === null || this === undefined) {
      throw new TypeError('Array.prototype.forEach called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var t = Object(this);
    var len = t.length >>> 0;
    for (var i = 0; i < len; i++) {
      if (i in t) {
        callback.call(thisArg, t[i], i, t);
      }
    }
  });

  defineProp(Array.prototype, 'map', function map(callback, thisArg) {
    if (this === null || this === undefined) {
      throw new TypeError('Array.prototype.map called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var t = Object(this);
    var len = t.length >>> 0;
    var result = new Array(len);
    for (var i = 0; i < len; i++) {
      if (i in t) {
        result[i] = callback.call(thisArg, t[i], i, t);
      }
    }
    return result;
  });

  defineProp(Array.prototype, 'filter', function filter(callback, thisArg) {
    if (this === null || this === undefined) {
      throw new TypeError('Array.prototype.filter called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var t = Object(this);
    var len = t.length >>> 0;
    var result = [];
    for (var i = 0; i < len; i++) {
      if (i in t) {
        var value = t[i];
        if (callback.call(thisArg, value, i, t)) {
          result.push(value);
        }
      }
    }
    return result;
  });

  defineProp(Array.prototype, 'reduce', function reduce(callback) {
    if (this === null || this === undefined) {
      throw new TypeError('Array.prototype.reduce called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var t = Object(this);
    var len = t.length >>> 0;
    var k = 0;
    var value;
    if (arguments.length >= 2) {
      value = arguments[1];
    } else {
      while (k < len && !(k in t)) {
        k++;
      }
      if (k >= len) {
        throw new TypeError('Reduce of empty array with no initial value');
      }
      value = t[k++];
    }
    for (; k < len; k++) {
      if (k in t) {
        value = callback(value, t[k], k, t);
      }
    }
    return value;
  });

  defineProp(Array.prototype, 'reduceRight', function reduceRight(callback) {
    if (this === null || this === undefined) {
      throw new TypeError('Array.prototype.reduceRight called on null or undefined');
    }
    if (typeof callback !== 'function') {
      throw new TypeError(callback + ' is not a function');
    }
    var t = Object(this);
    var k = (t.length >>> 0) - 1;
    var value;
    if (arguments.length >= 2) {
      value = arguments[1];
    } else {
      while (k >= 0 && !(k in t)) {
        k--;
      }
      if (k < 0) {
        throw new TypeError('Reduce of empty array with no initial value');
      }
      value = t[k--];
    }
    for (; k >= 0; k--) {
      if (k in t) {
        value = callback(value, t[k], k, t);
      }
    }
    return value;
  });

  defineProp(Array.prototype, 'sort', function sort(comparator) {
    if (this === null || this === undefined) {
      throw new TypeError('Array.prototype.sort called on null or undefined');
    }
    var len = this.length >>> 0;
    var values = [];
    var undefs = 0;
    for (var i = 0; i < len; i++) {
      if (i in this) {
        if (this[i] === undefined) {
          undefs++;
        } else {
          values.push(this[i]);
        }
      }
    }
    var compare = comparator;
    if (compare === undefined) {
      compare = function(a, b) {
        var x = String(a);
        var y = String(b);
        if (x < y) return -1;
        if (x > y) return 1;
        return 0;
      };
    }
    for (var j = 1; j < values.length; j++) {
      var item = values[j];
      var k = j - 1;
      while (k >= 0 && compare(values[k], item) > 0) {
        values[k + 1] = values[k];
        k--;
      }
      values[k + 1] = item;
    }
    // Sorted values, then undefined, then the holes.
    for (i = 0; i < values.length; i++) {
      this[i] = values[i];
    }
    for (; i < values.length + undefs; i++) {
      this[i] = undefined;
    }
    for (; i < len; i++) {
      delete this[i];
    }
    return this;
  });

  defineProp(Array.prototype, 'toLocaleString', function toLocaleString() {
    var t = Object(this);
    var parts = [];
    for (var i = 0; i < t.length; i++) {
      var element = t[i];
      parts.push(
        (element === null || element === undefined) ? '' : element.toLocaleString()
      );
    }
    return parts.join(',');
  });

  var replace_ = String.prototype.replace;
  defineProp(String.prototype, 'replace', function replace(pattern, replacement) {
    if (typeof replacement !== 'function') {
      return replace_.call(this, pattern, replacement);
    }
    var str = String(this);
    if (pattern instanceof RegExp) {
      var subs = [];
      var m = pattern.exec(str);
      while (m) {
        m.push(m.index, str);
        subs.push([m.index, m[0].length, replacement.apply(undefined, m)]);
        if (pattern.global) {
          if (m[0] === '') {
            pattern.lastIndex = pattern.lastIndex + 1;
          }
          m = pattern.exec(str);
        } else {
          m = null;
        }
      }
      for (var i = subs.length - 1; i >= 0; i--) {
        var start = subs[i][0];
        var length = subs[i][1];
        str = str.substring(0, start) + subs[i][2] + str.substring(start + length);
      }
      return str;
    }
    pattern = String(pattern);
    var index = str.indexOf(pattern);
    if (index === -1) {
      return str;
    }
    return str.substring(0, index) +
        replacement(pattern, index, str) +
        str.substring(index + pattern.length);
  });
})();
"#;
